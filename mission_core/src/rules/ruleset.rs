//! Rule set definitions - the declarative layer over session facts.

use serde::{Deserialize, Serialize};

/// The conclusion a rule derives from session facts.
///
/// Each variant corresponds to one canonical derivation; the parameters are
/// rule data, so e.g. the team multiplier can be changed without touching
/// the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Derivation {
    /// Some answer at a designated risk index was incorrect.
    RiskFailed,
    /// Status: risk failure forces a reset, overriding all other outcomes.
    ResetOnRiskFailure,
    /// Status: the session's deadline passed before completion.
    ResetOnDeadline,
    /// Status: every required question has a correct or challenge-success
    /// answer and no reset applies.
    PassWhenComplete,
    /// Status: default when nothing else holds.
    HoldInProgress,
    /// A strict majority of team answers were correct.
    TeamSuccess,
    /// Final session points: base points scaled when team success holds.
    FinalPoints { team_multiplier: f64 },
    /// Index of the next permitted question.
    NextQuestion,
}

/// A named rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub derives: Derivation,
}

impl Rule {
    pub fn new(name: impl Into<String>, derives: Derivation) -> Self {
        Self {
            name: name.into(),
            derives,
        }
    }
}

/// A fixed, versioned list of rules.
///
/// Ordering carries no meaning: mutually exclusive status outcomes are
/// resolved by the evaluator's fixed precedence (risk reset > deadline
/// reset > passed > in-progress), never by list position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub version: String,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// The canonical mission rule set.
    pub fn standard() -> Self {
        Self {
            version: "1".to_string(),
            rules: vec![
                Rule::new("risk_failed", Derivation::RiskFailed),
                Rule::new("status_reset_risk", Derivation::ResetOnRiskFailure),
                Rule::new("status_reset_deadline", Derivation::ResetOnDeadline),
                Rule::new("status_passed", Derivation::PassWhenComplete),
                Rule::new("status_in_progress", Derivation::HoldInProgress),
                Rule::new("team_success", Derivation::TeamSuccess),
                Rule::new(
                    "points_final",
                    Derivation::FinalPoints {
                        team_multiplier: 3.0,
                    },
                ),
                Rule::new("next_question", Derivation::NextQuestion),
            ],
        }
    }

    /// Find the rule carrying a given derivation, if any.
    pub fn find(&self, matches: impl Fn(&Derivation) -> bool) -> Option<&Rule> {
        self.rules.iter().find(|r| matches(&r.derives))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::standard()
    }
}
