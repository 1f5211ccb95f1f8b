// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Clock
//!
//! This module provides [`Clock`], the per-key container of a multi-master
//! key-value store: the compact causal history of the key together with the
//! currently live *sibling* values, values written concurrently whose order
//! causality alone cannot decide.
//!
//! ## Entries
//!
//! A clock holds one entry per replica that wrote to the key. An entry pairs
//! the replica's retired dots (a [`DotSet`]: events whose values have been
//! superseded) with its live dotted values, newest first. Dots of live
//! values stay out of the retired set; the union of the two is everything
//! ever observed from that replica, and is what [`Clock::join`] reports.
//!
//! ## Merging
//!
//! [`Clock::sync`] merges two states of the same key. Per replica, a value
//! survives iff its dot is unknown to the other side's retired history:
//! either the other side never saw the event, or it still holds the value
//! live. Anonymous values (values that never received a dot, or whose dot
//! was retired) survive unless the other clock as a whole supersedes them.
//!
//! ## Writes
//!
//! A write is staged as a clock with exactly one anonymous candidate value
//! and, via [`Clock::in_context`], the causal context of the read it is
//! based on. [`Clock::update_with`] folds that context into the server's
//! state, discarding everything the writer had already seen, and then mints
//! a fresh event for the coordinating replica. The result strictly
//! dominates both inputs.

use std::{cmp::Ordering, fmt};

use smallvec::{SmallVec, smallvec};

use crate::causal_context::{CausalContext, DotSet};

/// Live dotted values of one entry, newest first.
///
/// One live value is by far the most common case (a quiet key has exactly
/// its latest write), so one pair is stored inline.
pub(crate) type DottedValues<V> = SmallVec<[(u64, V); 1]>;

/// Per-replica bucket of a [`Clock`]: the retired dots and the live values.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub(crate) struct Entry<I, V> {
    pub(crate) id: I,
    pub(crate) dots: DotSet,
    pub(crate) values: DottedValues<V>,
}

impl<I: fmt::Debug, V: fmt::Debug> fmt::Debug for Entry<I, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:?}, {:?}, {:?})", self.id, self.dots, self.values)
    }
}

impl<I, V> Entry<I, V> {
    // Everything ever observed from this replica: retired and live alike.
    pub(crate) fn summary_dots(&self) -> DotSet {
        let mut dots = self.dots.clone();
        for &(dot, _) in &self.values {
            dots.insert(dot);
        }
        dots
    }

    // The largest dot known for this replica, live or retired; 0 if none.
    fn max_dot(&self) -> u64 {
        self.values
            .iter()
            .fold(self.dots.max(), |max, &(dot, _)| max.max(dot))
    }
}

impl<I: PartialEq, V> Entry<I, V> {
    fn merge(self, other: Self) -> Self {
        debug_assert!(self.id == other.id, "only same-id entries merge");
        let Entry { id, dots, values } = self;
        // A value survives the merge iff its dot is unknown to the combined
        // retired history; knowing a dot while no longer holding its value
        // is exactly what "this write was superseded" means.
        let mut seen = dots;
        seen.union_with(&other.dots);
        let kept = discard(&seen, values);
        let mut other_kept = discard(&seen, other.values);
        // A dot is minted exactly once, so a dot live on both sides carries
        // the same value; keep the copy already taken from the left operand.
        other_kept.retain(|&mut (dot, _)| kept.iter().all(|&(ours, _)| ours != dot));
        let mut values = kept;
        values.extend(other_kept);
        // each side was newest first on its own, but one side's survivors
        // may be newer than the other's head; restore the global order
        values.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        Entry {
            id,
            dots: seen,
            values,
        }
    }
}

// Splits dotted values against a retired-dot summary. Values whose dot the
// summary covers have been superseded and are dropped; the summary needs no
// updating for them, as a dropped dot is a member by definition. Survivors
// keep their relative order.
fn discard<V>(seen: &DotSet, values: DottedValues<V>) -> DottedValues<V> {
    values
        .into_iter()
        .filter(|&(dot, _)| !seen.contains(dot))
        .collect()
}

// Classic sorted merge of two entry runs: unshared ids are taken verbatim,
// shared ids are merged pairwise.
fn merge_entries<I: Ord, V>(
    ours: Vec<Entry<I, V>>,
    theirs: Vec<Entry<I, V>>,
) -> Vec<Entry<I, V>> {
    let mut merged = Vec::with_capacity(ours.len().max(theirs.len()));
    let mut ours = ours.into_iter().peekable();
    let mut theirs = theirs.into_iter().peekable();
    loop {
        match (ours.peek(), theirs.peek()) {
            (Some(o), Some(t)) => match o.id.cmp(&t.id) {
                Ordering::Less => merged.push(ours.next().expect("peeked")),
                Ordering::Greater => merged.push(theirs.next().expect("peeked")),
                Ordering::Equal => {
                    let ours = ours.next().expect("peeked");
                    let theirs = theirs.next().expect("peeked");
                    merged.push(ours.merge(theirs));
                }
            },
            (Some(_), None) => merged.push(ours.next().expect("peeked")),
            (None, Some(_)) => merged.push(theirs.next().expect("peeked")),
            (None, None) => break,
        }
    }
    merged
}

// Records a fresh event authored by `id`. The new dot is one past the
// largest dot known for `id`, so it is strictly greater than every dot the
// entry has seen, gaps included.
fn event<I: Ord, V>(entries: &mut Vec<Entry<I, V>>, id: I, value: V) {
    match entries.binary_search_by(|entry| entry.id.cmp(&id)) {
        Ok(i) => {
            let entry = &mut entries[i];
            let dot = entry.max_dot() + 1;
            entry.values.insert(0, (dot, value));
        }
        Err(i) => entries.insert(
            i,
            Entry {
                id,
                dots: DotSet::new(),
                values: smallvec![(1, value)],
            },
        ),
    }
}

/// Error returned when a clock passed to [`Clock::update`] or
/// [`Clock::update_with`] is not a staged write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// A write must carry exactly one anonymous candidate value.
    CandidateCount(usize),
    /// A write context may not carry live dotted values.
    DottedValues,
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::CandidateCount(n) => {
                write!(f, "a write must carry exactly one candidate value, got {n}")
            }
            UpdateError::DottedValues => {
                write!(f, "a write context may not carry dotted values")
            }
        }
    }
}

impl std::error::Error for UpdateError {}

/// The value stored for one key: compact causal history plus live siblings.
///
/// A `Clock` is a pure immutable value; every operation returns a fresh
/// clock and never mutates its arguments beyond consuming them. The
/// embedding store persists the returned clock in place of the prior one
/// and serializes writes per key.
///
/// `I` is an opaque, totally ordered replica identifier; `V` is an opaque,
/// equality-comparable payload. Neither is interpreted beyond that.
///
/// Note that `==` compares clocks structurally, payload bytes included,
/// while [`Clock::equal`] compares causal histories only; see there.
#[derive(Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct Clock<I, V> {
    pub(crate) entries: Vec<Entry<I, V>>,
    pub(crate) anonymous: Vec<V>,
}

impl<I: fmt::Debug, V: fmt::Debug> fmt::Debug for Clock<I, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:?}, {:?}}}", self.entries, self.anonymous)
    }
}

impl<I, V> Default for Clock<I, V> {
    fn default() -> Self {
        Clock {
            entries: Vec::new(),
            anonymous: Vec::new(),
        }
    }
}

impl<I, V> Clock<I, V> {
    /// Constructs a clock holding the given values with no causal history.
    ///
    /// This is the shape of a client's very first write to a key, before any
    /// context exists to echo back.
    pub fn new(values: impl IntoIterator<Item = V>) -> Self {
        Clock {
            entries: Vec::new(),
            anonymous: values.into_iter().collect(),
        }
    }

    /// True if the clock has neither history nor values.
    ///
    /// The empty clock is the neutral element of [`Clock::sync`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.anonymous.is_empty()
    }

    /// The total number of live values, dotted and anonymous.
    #[must_use]
    pub fn size(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.values.len())
            .sum::<usize>()
            + self.anonymous.len()
    }

    /// The ids of all replicas with an entry, in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = &I> + '_ {
        self.entries.iter().map(|entry| &entry.id)
    }

    /// All live values: anonymous values first, then each entry's dotted
    /// values newest first, in entry order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.anonymous.iter().chain(
            self.entries
                .iter()
                .flat_map(|entry| entry.values.iter().map(|(_, value)| value)),
        )
    }

    /// Rewrites every value, dotted and anonymous, preserving structure.
    pub fn map<U>(self, mut transform: impl FnMut(V) -> U) -> Clock<I, U> {
        let entries = self
            .entries
            .into_iter()
            .map(|entry| Entry {
                id: entry.id,
                dots: entry.dots,
                values: entry
                    .values
                    .into_iter()
                    .map(|(dot, value)| (dot, transform(value)))
                    .collect(),
            })
            .collect();
        let anonymous = self.anonymous.into_iter().map(transform).collect();
        Clock { entries, anonymous }
    }
}

impl<I: Ord + Clone, V> Clock<I, V> {
    /// Constructs a clock holding the given values on top of a causal
    /// context, typically the [`Clock::join`] of a preceding read.
    ///
    /// This is the shape of a staged write: the context records everything
    /// the writer has seen (and thereby intends to supersede), while the
    /// values await their dot from [`Clock::update_with`].
    pub fn in_context(context: &CausalContext<I>, values: impl IntoIterator<Item = V>) -> Self {
        Clock {
            entries: context
                .iter()
                .map(|(id, dots)| Entry {
                    id: id.clone(),
                    dots: dots.clone(),
                    values: SmallVec::new(),
                })
                .collect(),
            anonymous: values.into_iter().collect(),
        }
    }

    /// Extracts the causal summary: per replica, every dot ever observed,
    /// live or retired.
    ///
    /// This is the version context a client should echo back on its next
    /// write to the key.
    #[must_use]
    pub fn join(&self) -> CausalContext<I> {
        CausalContext::from_sorted(
            self.entries
                .iter()
                .map(|entry| (entry.id.clone(), entry.summary_dots())),
        )
    }

    /// True if `other` has observed every event this clock has, and at least
    /// one more. Anonymous values play no part in the comparison.
    ///
    /// Two clocks with mutually unknown events are concurrent: `less` is
    /// false both ways.
    #[must_use]
    pub fn less(&self, other: &Self) -> bool {
        self.join() < other.join()
    }

    /// True if this clock causally supersedes `other`, making `other`'s
    /// values obsolete.
    #[must_use]
    pub fn dominates(&self, other: &Self) -> bool {
        other.less(self)
    }
}

impl<I: PartialEq, V> Clock<I, V> {
    /// Causal equality: same entries with identical retired dots and the
    /// same number of live values each.
    ///
    /// Value payloads and anonymous values are not compared; two replicas
    /// agree causally as soon as their histories match. Use `==` for full
    /// structural equality.
    #[must_use]
    pub fn equal(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .zip(&other.entries)
                .all(|(ours, theirs)| {
                    ours.id == theirs.id
                        && ours.dots == theirs.dots
                        && ours.values.len() == theirs.values.len()
                })
    }
}

impl<I: Ord + Clone, V: PartialEq> Clock<I, V> {
    /// Merges two states of the same key, keeping every value not causally
    /// superseded and discarding the rest.
    ///
    /// Dotted values are decided per replica by the merged retired history.
    /// Anonymous values carry no dot, so whole-clock domination is the only
    /// thing that can discard them: a strictly greater side keeps only its
    /// own, otherwise all anonymous values survive, deduplicated.
    ///
    /// `sync` is commutative, associative and idempotent with respect to
    /// [`Clock::equal`].
    #[must_use]
    pub fn sync(self, other: Self) -> Self {
        let cmp = if self.anonymous.is_empty() && other.anonymous.is_empty() {
            // nothing to apportion, skip the comparison
            Some(Ordering::Equal)
        } else {
            self.join().partial_cmp(&other.join())
        };
        let Clock { entries, anonymous } = self;
        let Clock {
            entries: other_entries,
            anonymous: other_anonymous,
        } = other;
        let anonymous = match cmp {
            Some(Ordering::Less) => other_anonymous,
            Some(Ordering::Greater) => anonymous,
            // concurrent or equal histories: all anonymous values stay
            _ => {
                let mut merged = Vec::with_capacity(anonymous.len() + other_anonymous.len());
                for value in anonymous.into_iter().chain(other_anonymous) {
                    if !merged.contains(&value) {
                        merged.push(value);
                    }
                }
                merged
            }
        };
        Clock {
            entries: merge_entries(entries, other_entries),
            anonymous,
        }
    }

    /// Merges any number of clocks, starting from the empty clock.
    #[must_use]
    pub fn sync_all(clocks: impl IntoIterator<Item = Self>) -> Self {
        clocks.into_iter().fold(Self::default(), Self::sync)
    }

    /// Turns a staged write into an event authored by `id`, with no server
    /// state to reconcile against.
    ///
    /// `self` must be a staged write: exactly one anonymous candidate value
    /// and no dotted values (the shape [`Clock::new`] and
    /// [`Clock::in_context`] produce).
    pub fn update(self, id: I) -> Result<Self, UpdateError> {
        let (mut entries, value) = self.into_write()?;
        event(&mut entries, id, value);
        Ok(Clock {
            entries,
            anonymous: Vec::new(),
        })
    }

    /// Turns a staged write into an event authored by `id` on top of the
    /// server's current state for the key.
    ///
    /// The write's context is folded into the server state first, without
    /// the candidate value taking part in the merge: server values the
    /// writer had already seen are discarded, concurrent ones are kept as
    /// siblings. The result is strictly causally greater than both inputs.
    ///
    /// `self` must be a staged write, as for [`Clock::update`].
    pub fn update_with(self, server: Self, id: I) -> Result<Self, UpdateError> {
        let (entries, value) = self.into_write()?;
        let Clock {
            mut entries,
            anonymous,
        } = Clock {
            entries,
            anonymous: Vec::new(),
        }
        .sync(server);
        event(&mut entries, id, value);
        Ok(Clock { entries, anonymous })
    }

    fn into_write(self) -> Result<(Vec<Entry<I, V>>, V), UpdateError> {
        let Clock {
            entries,
            mut anonymous,
        } = self;
        if entries.iter().any(|entry| !entry.values.is_empty()) {
            return Err(UpdateError::DottedValues);
        }
        match anonymous.len() {
            1 => Ok((entries, anonymous.pop().expect("length checked above"))),
            n => Err(UpdateError::CandidateCount(n)),
        }
    }
}
