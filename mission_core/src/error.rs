//! Engine error kinds.

use quest_rules::World;
use thiserror::Error;

/// Errors surfaced by the mission engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Request rejected before any state mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown hypothesis, progress key, or user.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// Policy lookup failed. Callers substitute the built-in default
    /// policy rather than failing the request.
    #[error("no policy available for world {0}")]
    PolicyUnavailable(World),

    /// Rule set malformed or fact types mismatched. Gating treats this as
    /// in-progress/no-advance, never as a pass.
    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::not_found("hypothesis", "abc");
        assert_eq!(err.to_string(), "hypothesis not found: abc");

        let err = EngineError::validation("missing mission id");
        assert!(err.to_string().contains("missing mission id"));
    }
}
