//! Fact definitions - immutable observation tuples.

use chrono::{DateTime, Utc};
use quest_rules::{QuestKind, SessionKey};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactId(pub Uuid);

impl FactId {
    /// Create a new random fact ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Predicate names in the session fact schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// index, kind, correct, at
    Attempt,
    /// index, success
    Challenge,
    /// at
    Deadline,
    /// at
    Now,
    /// points
    BasePoints,
    /// n
    RequiredCount,
    /// index
    RiskIndex,
    /// index
    TeamIndex,
    /// member, correct
    TeamAnswer,
    /// n
    TeamSize,
    /// index
    CurrentIndex,
    /// Extension point for rule sets beyond the standard schema.
    Custom(String),
}

impl Predicate {
    pub fn as_str(&self) -> &str {
        match self {
            Predicate::Attempt => "attempt",
            Predicate::Challenge => "challenge",
            Predicate::Deadline => "deadline",
            Predicate::Now => "now",
            Predicate::BasePoints => "base_points",
            Predicate::RequiredCount => "required_count",
            Predicate::RiskIndex => "risk_index",
            Predicate::TeamIndex => "team_index",
            Predicate::TeamAnswer => "team_answer",
            Predicate::TeamSize => "team_size",
            Predicate::CurrentIndex => "current_index",
            Predicate::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed positional argument of a fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl FactValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FactValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FactValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FactValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FactValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<&str> for FactValue {
    fn from(value: &str) -> Self {
        FactValue::Str(value.to_string())
    }
}

impl From<String> for FactValue {
    fn from(value: String) -> Self {
        FactValue::Str(value)
    }
}

impl From<i64> for FactValue {
    fn from(value: i64) -> Self {
        FactValue::Int(value)
    }
}

impl From<bool> for FactValue {
    fn from(value: bool) -> Self {
        FactValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for FactValue {
    fn from(value: DateTime<Utc>) -> Self {
        FactValue::Timestamp(value)
    }
}

/// An immutable observation about a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub predicate: Predicate,
    pub session: SessionKey,
    pub args: Vec<FactValue>,
    pub recorded_at: DateTime<Utc>,
}

impl Fact {
    /// Create a fact with arbitrary arguments.
    pub fn new(session: SessionKey, predicate: Predicate, args: Vec<FactValue>) -> Self {
        Self {
            id: FactId::new(),
            predicate,
            session,
            args,
            recorded_at: Utc::now(),
        }
    }

    /// One answer to question `index`. Multiple attempt facts at the same
    /// index are independent sub-parts of that question.
    pub fn attempt(
        session: SessionKey,
        index: u32,
        kind: QuestKind,
        correct: bool,
        at: DateTime<Utc>,
    ) -> Self {
        Self::new(
            session,
            Predicate::Attempt,
            vec![
                FactValue::Int(index as i64),
                FactValue::Str(kind.as_str().to_string()),
                FactValue::Bool(correct),
                FactValue::Timestamp(at),
            ],
        )
    }

    /// Outcome of the boss challenge linked to question `index`.
    pub fn challenge(session: SessionKey, index: u32, success: bool) -> Self {
        Self::new(
            session,
            Predicate::Challenge,
            vec![FactValue::Int(index as i64), FactValue::Bool(success)],
        )
    }

    pub fn deadline(session: SessionKey, at: DateTime<Utc>) -> Self {
        Self::new(session, Predicate::Deadline, vec![FactValue::Timestamp(at)])
    }

    /// The evaluation wall clock. Time is a fact, never read from the
    /// system clock, so evaluation stays reproducible.
    pub fn now(session: SessionKey, at: DateTime<Utc>) -> Self {
        Self::new(session, Predicate::Now, vec![FactValue::Timestamp(at)])
    }

    pub fn base_points(session: SessionKey, points: i64) -> Self {
        Self::new(session, Predicate::BasePoints, vec![FactValue::Int(points)])
    }

    pub fn required_count(session: SessionKey, n: u32) -> Self {
        Self::new(
            session,
            Predicate::RequiredCount,
            vec![FactValue::Int(n as i64)],
        )
    }

    pub fn risk_index(session: SessionKey, index: u32) -> Self {
        Self::new(
            session,
            Predicate::RiskIndex,
            vec![FactValue::Int(index as i64)],
        )
    }

    pub fn team_index(session: SessionKey, index: u32) -> Self {
        Self::new(
            session,
            Predicate::TeamIndex,
            vec![FactValue::Int(index as i64)],
        )
    }

    pub fn team_answer(session: SessionKey, member: impl Into<String>, correct: bool) -> Self {
        Self::new(
            session,
            Predicate::TeamAnswer,
            vec![FactValue::Str(member.into()), FactValue::Bool(correct)],
        )
    }

    pub fn team_size(session: SessionKey, n: u32) -> Self {
        Self::new(session, Predicate::TeamSize, vec![FactValue::Int(n as i64)])
    }

    pub fn current_index(session: SessionKey, index: u32) -> Self {
        Self::new(
            session,
            Predicate::CurrentIndex,
            vec![FactValue::Int(index as i64)],
        )
    }

    /// Structural equality ignoring the fact ID and recording time.
    ///
    /// Two facts are the same observation when predicate, session, and
    /// arguments all match. The store uses this for set semantics.
    pub fn same_observation(&self, other: &Fact) -> bool {
        self.predicate == other.predicate
            && self.session == other.session
            && self.args == other.args
    }
}
