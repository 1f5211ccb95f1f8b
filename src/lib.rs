// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # dvvset: Compact Dotted Version Vector Sets
//!
//! This crate provides the causal-history machinery for one key of an
//! eventually-consistent, multi-master key-value store. Each [`Clock`] is
//! the value stored for a single key: a compact summary of every write the
//! key has ever seen, together with the currently live *sibling* values,
//! values produced by concurrent writes whose order causality alone cannot
//! decide.
//!
//! The design follows the dotted-version-vector approach to server-side
//! causality tracking: instead of one counter per client, each write is
//! tagged with a *dot*, a `(replica, counter)` pair minted by the
//! coordinating server replica. Dots make sibling explosion impossible (the
//! number of siblings is bounded by the number of server replicas, not
//! clients) while contexts stay small enough to ship with every read.
//!
//! ## Core Concepts
//!
//! - **Dot**: one write event, identified by the coordinating replica and a
//!   per-replica counter. Stored compactly as just the counter inside that
//!   replica's entry.
//! - **Sibling**: one of several concurrently live values for the key. A
//!   read returns all siblings; a subsequent write that echoes the read's
//!   context supersedes all of them.
//! - **[`CausalContext`]**: the values-stripped summary of a clock, as
//!   returned by [`Clock::join`]. Clients carry it between a read and the
//!   next write; replicas compare contexts to decide what is newer, what is
//!   older, and what is concurrent.
//! - **Anonymous value**: a value carried by a clock without a dot, either
//!   because it is a write candidate that has not been assigned one yet, or
//!   because its dot was retired while the value itself survived.
//!
//! All operations are pure functions: clocks are immutable values, and
//! every operation returns a fresh clock. Shared reads are therefore safe
//! across threads; the embedding store serializes writes per key.
//!
//! ## Getting Started: A Read-Modify-Write Cycle
//!
//! ```rust
//! use dvvset::Clock;
//!
//! // the stored state of one key; "a" and "b" are server replica ids
//! let server = Clock::<&str, &str>::default();
//!
//! // the first write to a key carries no context
//! let server = Clock::new(["original"]).update_with(server, "a")?;
//!
//! // two clients read the key, learning its causal context
//! let read = server.join();
//!
//! // both write against that same context, each through its own replica
//! let server = Clock::in_context(&read, ["from alice"]).update_with(server, "a")?;
//! let server = Clock::in_context(&read, ["from bob"]).update_with(server, "b")?;
//!
//! // "original" was seen by both writers and is gone; the two concurrent
//! // writes are kept side by side as siblings
//! assert_eq!(server.size(), 2);
//! assert_eq!(
//!     server.values().collect::<Vec<_>>(),
//!     [&"from alice", &"from bob"],
//! );
//!
//! // a later write that echoes a fresh read context collapses the conflict
//! let server = Clock::in_context(&server.join(), ["merged"]).update_with(server, "a")?;
//! assert_eq!(server.values().collect::<Vec<_>>(), [&"merged"]);
//! # Ok::<(), dvvset::UpdateError>(())
//! ```
//!
//! ## Resolving Conflicts
//!
//! Applications that would rather not surface siblings can collapse them
//! with the generic resolvers: [`Clock::last`] picks a winner under a
//! caller-supplied order, [`Clock::lww`] does the same but returns a full
//! clock whose summary supersedes the losers on every replica, and
//! [`Clock::reconcile`] lets the caller merge all siblings into one value
//! (a set union, a sum, a shopping cart merge). All three refuse a clock
//! that holds no values.
//!
//! ## Scope of this Crate
//!
//! This crate provides the data structures and the merge algebra, nothing
//! else. The embedding store remains responsible for:
//!
//! - replica identifiers (`I`: any equality-comparable, totally ordered
//!   opaque value) and value payloads (`V`: any equality-comparable opaque
//!   value),
//! - persistence, serialization and transport of clocks and contexts (the
//!   `serde` feature derives implementations that preserve entry and
//!   exception order, keeping [`Clock::equal`] byte-stable),
//! - serializing writes per key, and any store-level garbage collection.
//!
//! **It does not include any networking protocols.**
//!
//! ## Features
//!
//! - `serde`: `serde` support for [`Clock`], [`CausalContext`] and
//!   [`DotSet`].
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

pub mod causal_context;
pub use causal_context::{CausalContext, DotSet};
mod clock;
pub use clock::{Clock, UpdateError};
/// Macros usable for tests and initialization
pub mod macros;
mod resolve;
pub use resolve::EmptyClock;
