// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Causal Context
//!
//! This module provides the values-stripped summary of a clock's causal
//! history: for every replica that ever wrote to the key, the compact set of
//! event counters observed from it.
//!
//! - **[`DotSet`]**: the per-replica compact counter set, a contiguous base
//!   run plus exceptions above a gap.
//!
//! - **[`CausalContext`]**: an id-sorted sequence of `(replica, DotSet)`
//!   pairs. This is what [`Clock::join`](crate::Clock::join) produces, what a
//!   client carries between a read and its next write, and what
//!   [`Clock::in_context`](crate::Clock::in_context) accepts to seed a write
//!   with everything the client has seen.
//!
//! Comparing two contexts with `<`, `>` or [`PartialOrd::partial_cmp`] asks
//! the happens-before question: a context is strictly greater when it has
//! observed every event the other has, and at least one more. Contexts with
//! mutually unknown events are incomparable, which is how concurrent writes
//! are detected.

use std::{cmp::Ordering, fmt};

mod dotset;
pub use dotset::DotSet;

/// The set of events observed from each replica that wrote to a key.
///
/// Entries are kept sorted by replica id and hold a non-empty [`DotSet`]
/// each. A `CausalContext` carries no values; it is the version vector (with
/// exceptions) side of a [`Clock`](crate::Clock).
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct CausalContext<I> {
    entries: Vec<(I, DotSet)>,
}

impl<I: fmt::Debug> fmt::Debug for CausalContext<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CausalContext(")?;
        f.debug_map()
            .entries(self.entries.iter().map(|(id, set)| (id, set)))
            .finish()?;
        write!(f, ")")
    }
}

impl<I> Default for CausalContext<I> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<I> CausalContext<I> {
    /// Constructs an empty [`CausalContext`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a [`CausalContext`] from arbitrary `(id, set)` pairs.
    ///
    /// Pairs need not be sorted; sets given for the same id are unioned, and
    /// empty sets are dropped.
    pub fn from_parts(entries: impl IntoIterator<Item = (I, DotSet)>) -> Self
    where
        I: Ord,
    {
        let mut out: Vec<(I, DotSet)> = Vec::new();
        for (id, set) in entries {
            if set.is_empty() {
                continue;
            }
            match out.binary_search_by(|(have, _)| have.cmp(&id)) {
                Ok(i) => out[i].1.union_with(&set),
                Err(i) => out.insert(i, (id, set)),
            }
        }
        Self { entries: out }
    }

    // Callers must supply entries already sorted by id, unique, and
    // non-empty; used where that order comes for free.
    pub(crate) fn from_sorted(entries: impl IntoIterator<Item = (I, DotSet)>) -> Self
    where
        I: Ord,
    {
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|(_, set)| !set.is_empty())
            .collect();
        debug_assert!(
            entries.windows(2).all(|pair| pair[0].0 < pair[1].0),
            "entries must be sorted and unique by id"
        );
        Self { entries }
    }

    /// True if no event has been observed from any replica.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        debug_assert!(
            self.entries.iter().all(|(_, set)| !set.is_empty()),
            "should not retain empty dot sets"
        );
        self.entries.is_empty()
    }

    /// Return the total number of observed events.
    #[must_use]
    pub fn dot_count(&self) -> u64 {
        self.entries.iter().map(|(_, set)| set.dot_count()).sum()
    }

    /// The ids of all replicas with observed events, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &I> + '_ {
        self.entries.iter().map(|(id, _)| id)
    }

    /// Iterator over the `(id, set)` pairs, in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&I, &DotSet)> + '_ {
        self.entries.iter().map(|(id, set)| (id, set))
    }

    /// The set of events observed from the given replica, if any.
    #[must_use]
    pub fn get(&self, id: &I) -> Option<&DotSet>
    where
        I: Ord,
    {
        self.entries
            .binary_search_by(|(have, _)| have.cmp(id))
            .ok()
            .map(|i| &self.entries[i].1)
    }
}

impl<I: Ord> PartialOrd for CausalContext<I> {
    /// Returns the happens-after ordering between `self` and `other`.
    ///
    /// Specifically, returns:
    ///
    /// - `Some(Ordering::Equal)` if `self` == `other`
    /// - `Some(Ordering::Less)` if `other` happens-after `self`
    /// - `Some(Ordering::Greater)` if `self` happens-after `other`
    /// - `None` if there is no happens-after relationship between the two
    ///
    /// `a` happens-after `b` if `a` has observed every event that `b` has,
    /// and at least one more, meaning that `a` causally happens strictly
    /// after `b`.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        // the check is essentially "are all events in x also in y" plus
        // "does y have at least one event that x does not", decided per
        // replica on the two id-sorted entry lists.
        let mut ours = self.entries.iter().peekable();
        let mut theirs = other.entries.iter().peekable();
        let (mut o_unique, mut t_unique) = (false, false);
        loop {
            // early exit if both sides have events that don't appear in the
            // other - neither happened-before the other, so the ordering is
            // undefined.
            if o_unique && t_unique {
                return None;
            }
            match (ours.peek(), theirs.peek()) {
                (None, None) => break,
                (None, Some(_)) => {
                    t_unique = true;
                    // from this point on, every iteration would hit this
                    // case, so `o_unique` can't change anymore and it's safe
                    // to break early
                    break;
                }
                (Some(_), None) => {
                    // symmetrical of the arm above
                    o_unique = true;
                    break;
                }
                (Some((o_id, o_set)), Some((t_id, t_set))) => match o_id.cmp(t_id) {
                    Ordering::Equal => {
                        match o_set.partial_set_cmp(t_set) {
                            // identical sets
                            Some(Ordering::Equal) => (),
                            // theirs has events ours doesn't
                            Some(Ordering::Less) => t_unique = true,
                            // ours has events theirs doesn't
                            Some(Ordering::Greater) => o_unique = true,
                            // partial overlap, some unique events on either side
                            None => return None,
                        }
                        ours.next();
                        theirs.next();
                    }
                    Ordering::Less => {
                        // we have events for an id they don't
                        o_unique = true;
                        ours.next();
                    }
                    Ordering::Greater => {
                        // they have events for an id we don't
                        t_unique = true;
                        theirs.next();
                    }
                },
            }
        }
        match (o_unique, t_unique) {
            (true, true) => None,
            (true, false) => Some(Ordering::Greater),
            (false, true) => Some(Ordering::Less),
            (false, false) => Some(Ordering::Equal),
        }
    }
}

impl<I: Ord> FromIterator<(I, DotSet)> for CausalContext<I> {
    fn from_iter<T: IntoIterator<Item = (I, DotSet)>>(iter: T) -> Self {
        Self::from_parts(iter)
    }
}
