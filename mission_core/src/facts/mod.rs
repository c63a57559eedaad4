//! Fact model: typed, immutable observations about a mission session.
//!
//! Facts are the source of truth for rule evaluation. They are appended,
//! never mutated or removed; re-running the evaluator over an unchanged
//! fact set always yields the same result.

mod fact;
mod store;

pub use fact::*;
pub use store::*;
