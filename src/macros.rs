// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Macros usable for tests and initialization.

/// Convenience macro for creating a [`CausalContext`](crate::CausalContext)
/// with a given set of observed events.
///
/// Each entry is `id => base`, optionally followed by `+ [exceptions]` for
/// events observed above a gap:
///
/// ```rust
/// use dvvset::context;
///
/// let ctx = context! { "a" => 4 + [6], "b" => 1 };
/// assert_eq!(ctx.dot_count(), 6);
/// assert!(ctx.get(&"a").expect("has entry").contains(6));
/// assert!(!ctx.get(&"a").expect("has entry").contains(5));
/// ```
#[macro_export]
macro_rules! context {
    ( $( $id:expr => $base:literal $(+ [ $($exception:literal),* $(,)? ])? ),* $(,)? ) => {
        $crate::CausalContext::from_parts([
            $(
                (
                    $id,
                    $crate::DotSet::from_parts($base, [ $( $( $exception ),* )? ]),
                ),
            )*
        ])
    };
}
