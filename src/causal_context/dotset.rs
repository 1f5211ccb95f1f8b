// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # DotSet
//!
//! This module provides the `DotSet` data structure, the compact encoding of
//! the set of counters observed from a single replica.
//!
//! A `DotSet` holds the set `{1..=base} ∪ exceptions`: a contiguous run of
//! counters starting at 1, plus a sorted list of counters observed above a
//! gap. The run covers the overwhelmingly common case of a replica whose
//! events were all observed in order, so most sets are a single integer.
//! Exceptions only appear while knowledge of a replica's history has holes,
//! and they are re-absorbed into the base as soon as the holes close.

use std::{cmp::Ordering, fmt};

use smallvec::SmallVec;

/// The set of counters observed from a single replica, stored compactly.
///
/// Contains every counter in `1..=base` plus every counter in `exceptions`.
/// The structure is kept normalized at all times:
///
/// - `exceptions` is sorted and duplicate-free,
/// - every exception is strictly greater than `base + 1` (a counter equal to
///   `base + 1` is absorbed into the run, along with any contiguous
///   exceptions above it).
///
/// Counters are 1-based; `base == 0` with no exceptions is the empty set.
#[derive(Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Deserialize, ::serde::Serialize))]
pub struct DotSet {
    base: u64,
    exceptions: SmallVec<[u64; 2]>,
}

impl fmt::Debug for DotSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        match self.base {
            0 => {}
            1 => {
                set.entry(&format_args!("1"));
            }
            base => {
                set.entry(&format_args!("1..={base}"));
            }
        }
        for e in &self.exceptions {
            set.entry(e);
        }
        set.finish()
    }
}

impl DotSet {
    /// Constructs an empty [`DotSet`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a [`DotSet`] from a base run and arbitrary extra counters.
    ///
    /// The extra counters need not be sorted or unique, and counters already
    /// covered by the run are ignored; the result is normalized.
    #[must_use]
    pub fn from_parts(base: u64, exceptions: impl IntoIterator<Item = u64>) -> Self {
        let mut set = DotSet {
            base,
            exceptions: SmallVec::new(),
        };
        for counter in exceptions {
            set.insert(counter);
        }
        set
    }

    /// True if no counter is contained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base == 0 && self.exceptions.is_empty()
    }

    /// The number of counters contained.
    #[must_use]
    pub fn dot_count(&self) -> u64 {
        self.base + self.exceptions.len() as u64
    }

    /// The end of the contiguous run starting at 1.
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// The counters contained above the run, in ascending order.
    #[must_use]
    pub fn exceptions(&self) -> &[u64] {
        &self.exceptions
    }

    /// The largest counter contained, or 0 for the empty set.
    #[must_use]
    pub fn max(&self) -> u64 {
        self.exceptions.last().copied().unwrap_or(self.base)
    }

    /// Determines whether the given counter is contained.
    #[must_use]
    pub fn contains(&self, counter: u64) -> bool {
        counter != 0 && (counter <= self.base || self.exceptions.binary_search(&counter).is_ok())
    }

    /// Iterator over all contained counters, in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (1..=self.base).chain(self.exceptions.iter().copied())
    }

    /// Adds a counter to the set.
    ///
    /// Returns `true` if the counter was not already contained.
    pub fn insert(&mut self, counter: u64) -> bool {
        debug_assert_ne!(counter, 0, "counters are 1-based");
        if self.contains(counter) {
            return false;
        }
        if counter == self.base + 1 {
            self.base = counter;
            // closing the gap may make previously stranded exceptions
            // contiguous with the run
            self.lift();
        } else {
            let i = self.exceptions.partition_point(|&e| e < counter);
            self.exceptions.insert(i, counter);
        }
        true
    }

    /// Incorporates every counter of `other` into `self`.
    pub fn union_with(&mut self, other: &DotSet) {
        let base = self.base.max(other.base);
        let mut merged = SmallVec::new();
        let mut ours = self.exceptions.iter().copied().peekable();
        let mut theirs = other.exceptions.iter().copied().peekable();
        loop {
            let next = match (ours.peek(), theirs.peek()) {
                (Some(&o), Some(&t)) => match o.cmp(&t) {
                    Ordering::Less => {
                        ours.next();
                        o
                    }
                    Ordering::Greater => {
                        theirs.next();
                        t
                    }
                    Ordering::Equal => {
                        ours.next();
                        theirs.next();
                        o
                    }
                },
                (Some(&o), None) => {
                    ours.next();
                    o
                }
                (None, Some(&t)) => {
                    theirs.next();
                    t
                }
                (None, None) => break,
            };
            // exceptions of the side with the smaller base may have been
            // overtaken by the other side's run
            if next > base {
                merged.push(next);
            }
        }
        self.base = base;
        self.exceptions = merged;
        self.lift();
    }

    /// Returns whether `self` is a subset (A ⊆ B) of `other`.
    ///
    /// Note that if they are equal, this returns true. To test for proper
    /// subset (A ⊂ B) use [`Self::partial_set_cmp`] instead.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        // a normalized set always contains base + 1 if it contains anything
        // above base, so a longer run can never hide inside another set's
        // exceptions; comparing bases first is exact, not an approximation
        self.base <= other.base && self.exceptions.iter().all(|&e| other.contains(e))
    }

    /// Returns the partial ordering with respect to set inclusion.
    ///
    /// - If `self` is a proper subset of `other` (A ⊂ B), the result is `Less`.
    /// - If `self` is a proper superset of `other` (A ⊃ B), the result is `Greater`.
    /// - If both sets are the same (A = B), the result is `Equal`.
    ///
    /// Otherwise the result is `None`: each side contains counters the other
    /// does not.
    #[must_use]
    pub fn partial_set_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.is_subset(other), other.is_subset(self)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        }
    }

    // Absorbs the maximal contiguous run of exceptions starting at `base + 1`
    // into the base. Every mutation funnels through this, so exceptions never
    // linger once the gap below them has closed.
    fn lift(&mut self) {
        let mut run = 0;
        while run < self.exceptions.len() && self.exceptions[run] == self.base + 1 + run as u64 {
            run += 1;
        }
        if run > 0 {
            self.base += run as u64;
            self.exceptions.drain(..run);
        }
    }
}

impl Extend<u64> for DotSet {
    fn extend<T: IntoIterator<Item = u64>>(&mut self, iter: T) {
        for counter in iter {
            self.insert(counter);
        }
    }
}

impl FromIterator<u64> for DotSet {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ahash::HashSet;
    use std::collections::BTreeSet;

    impl DotSet {
        fn assert_normalized(&self) {
            for pair in self.exceptions.windows(2) {
                assert!(pair[0] < pair[1], "exceptions must be strictly sorted");
            }
            if let Some(&first) = self.exceptions.first() {
                assert!(first > self.base + 1, "exception {first} should be lifted");
            }
        }
    }

    #[test]
    fn empty() {
        let set = DotSet::new();
        assert!(set.is_empty());
        assert_eq!(set.dot_count(), 0);
        assert_eq!(set.max(), 0);
        assert!(!set.contains(1));
        assert_eq!(set.iter().next(), None);
    }

    #[test]
    fn sequential_insert() {
        let mut set = DotSet::new();
        assert!(set.insert(1));
        assert!(set.insert(2));
        assert!(set.insert(3));
        assert!(!set.insert(2));

        assert_eq!(set.base(), 3);
        assert_eq!(set.exceptions(), &[] as &[u64]);
        assert_eq!(set.max(), 3);
        assert_eq!(set.dot_count(), 3);
        assert!(set.contains(1) && set.contains(2) && set.contains(3));
        assert!(!set.contains(4));
        set.assert_normalized();
    }

    #[test]
    fn gaps_and_lift() {
        let mut set = DotSet::new();
        set.insert(1);
        set.insert(3);
        set.insert(5);
        assert_eq!(set.base(), 1);
        assert_eq!(set.exceptions(), &[3, 5]);
        assert_eq!(set.max(), 5);

        // closing the first gap absorbs 3 but not 5
        set.insert(2);
        assert_eq!(set.base(), 3);
        assert_eq!(set.exceptions(), &[5]);

        // closing the second gap collapses everything into the run
        set.insert(4);
        assert_eq!(set.base(), 5);
        assert_eq!(set.exceptions(), &[] as &[u64]);
        set.assert_normalized();
    }

    #[test]
    fn from_parts_normalizes() {
        // counters at or below the base are already covered
        let set = DotSet::from_parts(4, [2, 4, 7, 6, 7]);
        assert_eq!(set.base(), 4);
        assert_eq!(set.exceptions(), &[6, 7]);
        set.assert_normalized();

        // a contiguous prefix is lifted into the base
        let set = DotSet::from_parts(2, [3, 4, 6]);
        assert_eq!(set.base(), 4);
        assert_eq!(set.exceptions(), &[6]);
        set.assert_normalized();
    }

    #[test]
    fn union() {
        let mut left = DotSet::from_parts(3, [6]);
        let right = DotSet::from_parts(1, [4, 5, 8]);
        left.union_with(&right);
        assert_eq!(left.base(), 6);
        assert_eq!(left.exceptions(), &[8]);
        left.assert_normalized();

        let mut left = DotSet::new();
        left.union_with(&DotSet::from_parts(0, [2]));
        assert_eq!(left.base(), 0);
        assert_eq!(left.exceptions(), &[2]);
        left.assert_normalized();
    }

    #[test]
    fn set_compare() {
        let set = DotSet::from_parts(4, [6]);

        assert_eq!(
            set.partial_set_cmp(&DotSet::from_parts(4, [6])),
            Some(Ordering::Equal)
        );
        assert_eq!(
            set.partial_set_cmp(&DotSet::from_parts(2, [6])),
            Some(Ordering::Greater)
        );
        assert_eq!(
            set.partial_set_cmp(&DotSet::from_parts(6, [8])),
            Some(Ordering::Less)
        );
        // {1..=4, 6} vs {1..=5}: 6 only left, 5 only right
        assert_eq!(set.partial_set_cmp(&DotSet::from_parts(5, [])), None);
    }

    #[test]
    fn debug_repr() {
        assert_eq!(format!("{:?}", DotSet::new()), "{}");
        assert_eq!(format!("{:?}", DotSet::from_parts(1, [])), "{1}");
        assert_eq!(format!("{:?}", DotSet::from_parts(4, [6])), "{1..=4, 6}");
    }

    #[quickcheck]
    fn qc_insert_contains(counters: Vec<u8>) {
        let counters: Vec<u64> = counters.into_iter().map(|c| u64::from(c) + 1).collect();
        let set = DotSet::from_iter(counters.iter().copied());
        let model: BTreeSet<u64> = counters.into_iter().collect();

        for counter in 1..=u64::from(u8::MAX) + 1 {
            assert_eq!(set.contains(counter), model.contains(&counter));
        }
        assert_eq!(set.dot_count(), model.len() as u64);
        assert_eq!(set.max(), model.last().copied().unwrap_or(0));
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            model.into_iter().collect::<Vec<_>>()
        );
        set.assert_normalized();
    }

    #[quickcheck]
    fn qc_union(left: Vec<u8>, right: Vec<u8>) {
        let left: Vec<u64> = left.into_iter().map(|c| u64::from(c) + 1).collect();
        let right: Vec<u64> = right.into_iter().map(|c| u64::from(c) + 1).collect();

        let mut set = DotSet::from_iter(left.iter().copied());
        set.union_with(&DotSet::from_iter(right.iter().copied()));

        let model: HashSet<u64> = left.into_iter().chain(right).collect();
        for counter in 1..=u64::from(u8::MAX) + 1 {
            assert_eq!(set.contains(counter), model.contains(&counter));
        }
        assert_eq!(set.dot_count(), model.len() as u64);
        set.assert_normalized();
    }

    #[quickcheck]
    fn qc_set_compare(left: Vec<u8>, right: Vec<u8>) {
        let left: HashSet<u64> = left.into_iter().map(|c| u64::from(c) + 1).collect();
        let right: HashSet<u64> = right.into_iter().map(|c| u64::from(c) + 1).collect();
        let l_set = DotSet::from_iter(left.iter().copied());
        let r_set = DotSet::from_iter(right.iter().copied());

        let expected = match (left.is_subset(&right), right.is_subset(&left)) {
            (true, true) => Some(Ordering::Equal),
            (true, false) => Some(Ordering::Less),
            (false, true) => Some(Ordering::Greater),
            (false, false) => None,
        };
        assert_eq!(l_set.partial_set_cmp(&r_set), expected);
        assert_eq!(l_set.is_subset(&r_set), left.is_subset(&right));
    }
}
