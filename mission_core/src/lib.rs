//! # Mission Core (Questline)
//!
//! The engine behind adaptive learning missions. This crate interfaces
//! with `quest_rules`, keeps session truth as append-only facts, and
//! splits the work between a deliberate planner and a fast per-answer
//! executor.
//!
//! ## Core Components
//!
//! - **facts**: append-only, typed observations per (user, mission) session
//! - **rules**: declarative rule sets and the gating evaluator
//! - **rubric**: pure scoring of single attempts with behavioral signals
//! - **progress** / **hypothesis**: the two keyed mutable records
//! - **planner**: composes quest sequences, adapts difficulty ("System 2")
//! - **executor**: scores answers and feeds hints back ("System 1")
//!
//! ## Design Philosophy
//!
//! - **Facts are truth**: gating is always derived from the session's fact
//!   set, never from cached conclusions, and re-checked before every
//!   question transition
//! - **Deterministic**: scoring and evaluation are pure functions of their
//!   inputs, so every decision is reproducible and auditable
//! - **Fail closed**: evaluation problems hold the user in place; they can
//!   never accidentally grant a pass

pub mod error;
pub mod executor;
pub mod facts;
pub mod hypothesis;
pub mod planner;
pub mod progress;
pub mod rubric;
pub mod rules;

pub use error::*;
pub use executor::*;
pub use facts::*;
pub use hypothesis::*;
pub use planner::*;
pub use progress::*;
pub use rubric::*;
pub use rules::*;
