// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Collapsing siblings back into a single value.
//!
//! A [`Clock`] preserves every concurrent write as a sibling; at some point
//! the application wants one value back. This module provides the generic
//! resolvers:
//!
//! - [`Clock::last`] picks a winner under a caller-supplied order and
//!   returns just the value.
//! - [`Clock::lww`] picks the same winner but returns a whole clock: the
//!   causal summary is kept intact while every losing value is retired.
//! - [`Clock::reconcile`] hands *all* live values to a caller-supplied merge
//!   function and records its result as the sole survivor.
//!
//! The winner scan considers each entry's newest dotted value and every
//! anonymous value. The predicate passed to `last`/`lww` is a reflexive
//! `a <= b` in the caller's chosen order; on a tie the later candidate
//! wins, so an anonymous value that ties an entry's head takes the win.
//!
//! Resolving a clock that holds no values has no meaningful answer, so all
//! three resolvers refuse with [`EmptyClock`] instead.

use std::fmt;

use smallvec::{SmallVec, smallvec};

use crate::clock::{Clock, Entry};

/// Error returned when resolving a clock that holds no values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyClock;

impl fmt::Display for EmptyClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the clock holds no values to resolve")
    }
}

impl std::error::Error for EmptyClock {}

impl<I, V> Clock<I, V> {
    // Folds over all candidates (each entry's newest dotted value, then the
    // anonymous values) carrying the running winner and where it came from:
    // `Some(index)` for an entry head, `None` for an anonymous value.
    fn winner<F>(&self, mut le: F) -> Option<(Option<usize>, &V)>
    where
        F: FnMut(&V, &V) -> bool,
    {
        let heads = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry.values.first().map(|(_, value)| (Some(index), value))
            });
        let anonymous = self.anonymous.iter().map(|value| (None, value));
        let mut candidates = heads.chain(anonymous);
        let (mut origin, mut best) = candidates.next()?;
        for (candidate_origin, candidate) in candidates {
            if le(best, candidate) {
                origin = candidate_origin;
                best = candidate;
            }
        }
        Some((origin, best))
    }

    /// Returns the winning value under the given reflexive `a <= b`
    /// predicate.
    pub fn last<F>(&self, le: F) -> Result<&V, EmptyClock>
    where
        F: FnMut(&V, &V) -> bool,
    {
        self.winner(le).map(|(_, value)| value).ok_or(EmptyClock)
    }
}

impl<I: Ord + Clone, V: Clone> Clock<I, V> {
    /// Collapses the clock to the winning value under the given reflexive
    /// `a <= b` predicate, keeping the causal summary intact.
    ///
    /// The winner keeps its dot if it has one; every other value is retired.
    /// The result has the same [`Clock::join`] as `self`, so replicas that
    /// still hold the siblings will drop them on the next sync.
    pub fn lww<F>(&self, le: F) -> Result<Self, EmptyClock>
    where
        F: FnMut(&V, &V) -> bool,
    {
        let (origin, winner) = self.winner(le).ok_or(EmptyClock)?;
        match origin {
            // an anonymous winner has no dot to keep; re-seat it on the
            // full summary
            None => Ok(Clock::in_context(&self.join(), [winner.clone()])),
            Some(index) => {
                let entries = self
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(j, entry)| {
                        if j == index {
                            let (dot, value) =
                                entry.values.first().expect("origin points at a live head");
                            let mut dots = entry.dots.clone();
                            for &(superseded, _) in entry.values.iter().skip(1) {
                                dots.insert(superseded);
                            }
                            Entry {
                                id: entry.id.clone(),
                                dots,
                                values: smallvec![(*dot, value.clone())],
                            }
                        } else {
                            Entry {
                                id: entry.id.clone(),
                                dots: entry.summary_dots(),
                                values: SmallVec::new(),
                            }
                        }
                    })
                    .collect();
                Ok(Clock {
                    entries,
                    anonymous: Vec::new(),
                })
            }
        }
    }

    /// Collapses the clock to whatever the given function makes of all live
    /// values, keeping the causal summary intact.
    ///
    /// Unlike [`Clock::lww`] this need not pick one of the existing values;
    /// the function may combine them (sum them, merge shopping carts, ...).
    /// Its result is recorded anonymously on the full summary.
    pub fn reconcile<F>(&self, resolve: F) -> Result<Self, EmptyClock>
    where
        F: FnOnce(Vec<&V>) -> V,
    {
        if self.size() == 0 {
            return Err(EmptyClock);
        }
        let resolved = resolve(self.values().collect());
        Ok(Clock::in_context(&self.join(), [resolved]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::causal_context::{CausalContext, DotSet};

    fn entry(
        id: &'static str,
        base: u64,
        values: &[(u64, u64)],
    ) -> Entry<&'static str, u64> {
        Entry {
            id,
            dots: DotSet::from_parts(base, []),
            values: values.iter().copied().collect(),
        }
    }

    fn le(a: &u64, b: &u64) -> bool {
        a <= b
    }

    // Three writers with live values at dots a4, a3 and c1; a1, a2 and b1
    // were already superseded.
    fn sibling_clock(anonymous: Vec<u64>) -> Clock<&'static str, u64> {
        Clock {
            entries: vec![
                entry("a", 2, &[(4, 5), (3, 2)]),
                entry("b", 1, &[]),
                entry("c", 0, &[(1, 3)]),
            ],
            anonymous,
        }
    }

    #[test]
    fn last_picks_the_newest_head() {
        let x = sibling_clock(vec![]);
        assert_eq!(x.last(le), Ok(&5));

        // anonymous values compete too, and win ties
        let y = sibling_clock(vec![10, 0]);
        assert_eq!(y.last(le), Ok(&10));
    }

    #[test]
    fn lww_keeps_the_winning_dot() {
        let x = sibling_clock(vec![]);
        let resolved = x.lww(le).unwrap();
        assert_eq!(
            resolved,
            Clock {
                entries: vec![
                    Entry {
                        id: "a",
                        dots: DotSet::from_parts(3, []),
                        values: smallvec![(4, 5u64)],
                    },
                    entry("b", 1, &[]),
                    entry("c", 1, &[]),
                ],
                anonymous: vec![],
            }
        );
        assert_eq!(resolved.join(), x.join());
    }

    #[test]
    fn lww_reseats_an_anonymous_winner() {
        let y = sibling_clock(vec![10, 0]);
        let resolved = y.lww(le).unwrap();
        assert_eq!(
            resolved,
            Clock {
                entries: vec![entry("a", 4, &[]), entry("b", 1, &[]), entry("c", 1, &[])],
                anonymous: vec![10],
            }
        );
        assert_eq!(resolved.join(), y.join());
    }

    #[test]
    fn sync_keeps_resolvers_pointed_at_the_newest_dot() {
        // three stale writes through the same replica pile three siblings
        // into one entry
        let mut server: Clock<&str, u64> = Clock::default();
        for value in 1..=3u64 {
            server = Clock::in_context(&CausalContext::new(), [value])
                .update_with(server, "a")
                .expect("staged writes carry one candidate");
        }

        // a fourth stale write diverges before the conflict is resolved
        let late = Clock::in_context(&CausalContext::new(), [4u64])
            .update_with(server.clone(), "a")
            .expect("staged writes carry one candidate");

        // resolving the three-way conflict retires dots 1 and 2
        let resolved = server.lww(le).expect("non-empty");
        assert_eq!(resolved.values().collect::<Vec<_>>(), [&3]);

        // when the divergent write reaches the resolved state, the entry
        // must keep its values newest first so the winner scan still sees
        // the true newest sibling
        let merged = resolved.sync(late);
        assert_eq!(merged.entries[0].values.first(), Some(&(4, 4)));
        assert_eq!(merged.last(le), Ok(&4));
        let settled = merged.lww(le).expect("non-empty");
        assert_eq!(settled.values().collect::<Vec<_>>(), [&4]);
        assert_eq!(settled.join(), merged.join());
    }

    #[test]
    fn reconcile_combines_all_values() {
        let x = sibling_clock(vec![]);
        let summed = x
            .reconcile(|values| values.into_iter().copied().sum())
            .unwrap();
        assert_eq!(
            summed,
            Clock {
                entries: vec![entry("a", 4, &[]), entry("b", 1, &[]), entry("c", 1, &[])],
                anonymous: vec![10],
            }
        );

        let y = sibling_clock(vec![10, 0]);
        let smallest = y
            .reconcile(|values| values.into_iter().copied().min().expect("non-empty"))
            .unwrap();
        assert_eq!(smallest.anonymous, vec![0]);
        assert_eq!(smallest.join(), y.join());
    }

    #[test]
    fn empty_clocks_refuse_to_resolve() {
        let empty = Clock::<&str, u64>::default();
        assert_eq!(empty.last(le), Err(EmptyClock));
        assert_eq!(empty.lww(le).unwrap_err(), EmptyClock);
        assert_eq!(
            empty.reconcile(|_| unreachable!("no values to hand out")).unwrap_err(),
            EmptyClock
        );

        // a clock with history but no values has no winner either
        let valueless = Clock {
            entries: vec![entry("a", 3, &[])],
            anonymous: Vec::<u64>::new(),
        };
        assert_eq!(valueless.last(le), Err(EmptyClock));
    }

    // Builds a server with genuine siblings by occasionally writing with an
    // empty (fully stale) read context. Values are the write sequence
    // number, so newer writes always carry larger values and each entry's
    // head is its largest value, like a wall-clock timestamp would be.
    fn grown(ops: &[(u8, bool)]) -> Clock<u8, u16> {
        let mut server: Clock<u8, u16> = Clock::default();
        for (seq, &(id, stale)) in ops.iter().enumerate() {
            let context = if stale {
                CausalContext::new()
            } else {
                server.join()
            };
            let write = Clock::in_context(&context, [seq as u16]);
            server = write
                .update_with(server, id % 3)
                .expect("staged writes carry one candidate");
        }
        server
    }

    #[quickcheck]
    fn qc_last_agrees_with_max(ops: Vec<(u8, bool)>) {
        let server = grown(&ops);
        if server.size() == 0 {
            return;
        }
        let max = server.values().max().expect("non-empty");
        assert_eq!(server.last(|a, b| a <= b), Ok(max));
    }

    #[quickcheck]
    fn qc_lww_is_absorbed_by_sync(ops: Vec<(u8, bool)>) {
        let server = grown(&ops);
        if server.size() == 0 {
            return;
        }
        let resolved = server.lww(|a, b| a <= b).expect("non-empty");
        assert_eq!(resolved.size(), 1);
        assert_eq!(resolved.join(), server.join());

        // replicas still holding the siblings drop them on sync
        let merged = server.clone().sync(resolved.clone());
        assert!(merged.equal(&resolved));
        assert_eq!(
            merged.values().collect::<Vec<_>>(),
            resolved.values().collect::<Vec<_>>()
        );
    }
}
