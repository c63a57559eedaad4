//! Declarative rules and their evaluation.
//!
//! Rules are data: a [`RuleSet`](ruleset::RuleSet) describes *which*
//! derivations apply and under what names, and can be swapped without
//! touching the evaluator. The [`RuleEvaluator`](evaluator::RuleEvaluator)
//! trait is the pluggable solver seam; [`DirectEvaluator`](evaluator::DirectEvaluator)
//! is the in-process implementation. A delegating client to an external
//! Datalog service would implement the same trait.

mod evaluator;
mod ruleset;

pub use evaluator::*;
pub use ruleset::*;
