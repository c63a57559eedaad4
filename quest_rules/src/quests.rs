//! Quest definitions: worlds, difficulty scale, quest kinds, and quest data.

use serde::{Deserialize, Serialize};

use crate::ids::QuestId;

/// Thematic worlds a mission can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum World {
    #[default]
    Health,
    It,
    Legal,
    Public,
    Factory,
}

impl World {
    /// All worlds, in canonical order.
    pub const ALL: [World; 5] = [
        World::Health,
        World::It,
        World::Legal,
        World::Public,
        World::Factory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            World::Health => "health",
            World::It => "it",
            World::Legal => "legal",
            World::Public => "public",
            World::Factory => "factory",
        }
    }
}

impl std::fmt::Display for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for World {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "health" => Ok(World::Health),
            "it" => Ok(World::It),
            "legal" => Ok(World::Legal),
            "public" => Ok(World::Public),
            "factory" => Ok(World::Factory),
            other => Err(format!("unknown world: {other}")),
        }
    }
}

/// The ordered difficulty scale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    const SCALE: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

    /// Move along the scale by `delta` steps, clamped to the scale bounds.
    pub fn step(self, delta: i8) -> Self {
        let idx = Self::SCALE.iter().position(|d| *d == self).unwrap_or(1) as i8;
        let clamped = (idx + delta).clamp(0, Self::SCALE.len() as i8 - 1);
        Self::SCALE[clamped as usize]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quest kinds with distinct gating and scoring behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuestKind {
    /// Regular question; wrong answers simply do not advance.
    #[default]
    Standard,
    /// Failure forces a mission-wide reset, overriding other outcomes.
    Risk,
    /// Answered jointly; a team majority triples the session points.
    Team,
}

impl QuestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestKind::Standard => "standard",
            QuestKind::Risk => "risk",
            QuestKind::Team => "team",
        }
    }
}

impl std::fmt::Display for QuestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the fallback challenge linked to a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeOutcome {
    /// No challenge was attempted.
    #[default]
    None,
    Success,
    Fail,
}

/// A single answer choice on a quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestOption {
    pub id: String,
    pub text: String,
    pub correct: bool,
}

impl QuestOption {
    pub fn new(id: impl Into<String>, text: impl Into<String>, correct: bool) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            correct,
        }
    }
}

/// Guard parameters for risk quests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_attempts: u32,
    pub cooldown_ms: u64,
}

/// A single quest as composed by the planner. Immutable after plan time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    /// 1-based position in the mission's quest sequence.
    pub index: u32,
    pub world: World,
    pub kind: QuestKind,
    pub prompt: String,
    pub options: Vec<QuestOption>,
    /// Boss challenge played when a risk answer is wrong.
    pub challenge_id: Option<String>,
    pub risk: Option<RiskConfig>,
}

impl Quest {
    /// The ID of the correct option, if the quest has one.
    pub fn correct_option(&self) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.correct)
            .map(|o| o.id.as_str())
    }
}
