//! World policies - versioned, explicit configuration for mission
//! composition, risk guards, scoring tables, and narrative framing.
//!
//! Policies are data, loaded from TOML files or seeded from built-in
//! defaults. Nothing in the engine reads process-wide mutable state; every
//! component receives its policy at construction or per call.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

use crate::quests::{Difficulty, World};

/// Errors from the policy configuration layer.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("no policy registered for world {0}")]
    Unknown(World),

    #[error("failed to read policy file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse policy file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("policy file {} declares world {found}, expected {expected}", path.display())]
    WorldMismatch {
        path: PathBuf,
        expected: World,
        found: World,
    },

    #[error("invalid policy for world {world}: {reason}")]
    Invalid { world: World, reason: String },
}

fn default_policy_version() -> String {
    "1".to_string()
}

/// Mission shape: lives, quest count, and the positions of special quests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionPolicy {
    pub lives_start: u32,
    pub total_quests: u32,
    /// 1-based indexes of risk quests.
    pub risk_at: Vec<u32>,
    /// 1-based indexes of team quests.
    pub team_at: Vec<u32>,
}

impl Default for MissionPolicy {
    fn default() -> Self {
        Self {
            lives_start: 3,
            total_quests: 10,
            risk_at: vec![5, 10],
            team_at: vec![9],
        }
    }
}

/// Zone-of-proximal-development settings for the adaptive planner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ZpdPolicy {
    pub start: Difficulty,
}

/// Guard parameters applied to risk quests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskGuardPolicy {
    pub max_attempts: u32,
    pub cooldown_ms: u64,
    /// Boss challenge per risk question, keyed as "q5" -> challenge ID.
    #[serde(default)]
    pub challenge_ids: HashMap<String, String>,
}

impl Default for RiskGuardPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            cooldown_ms: 60_000,
            challenge_ids: HashMap::new(),
        }
    }
}

/// Bonus minigame rewards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BonusMinigamePolicy {
    pub points: i64,
    pub life_plus: u32,
    pub life_cap: u32,
}

impl Default for BonusMinigamePolicy {
    fn default() -> Self {
        Self {
            points: 5000,
            life_plus: 1,
            life_cap: 5,
        }
    }
}

/// Base points per quest kind plus bonus-minigame rewards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsPolicy {
    pub standard: i64,
    pub risk: i64,
    pub team: i64,
    #[serde(default)]
    pub bonus_minigame: BonusMinigamePolicy,
}

impl Default for PointsPolicy {
    fn default() -> Self {
        Self {
            standard: 200,
            risk: 400,
            team: 300,
            bonus_minigame: BonusMinigamePolicy::default(),
        }
    }
}

/// Team-success rate thresholds for the point multiplier ladder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TeamPolicy {
    /// Strictly above this rate: x3.
    pub triple_threshold: f64,
    /// Strictly above this rate (but not the triple threshold): x1.5.
    pub half_threshold: f64,
}

impl Default for TeamPolicy {
    fn default() -> Self {
        Self {
            triple_threshold: 0.5,
            half_threshold: 0.25,
        }
    }
}

/// Narrative framing text returned with a mission plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryPolicy {
    pub briefing: String,
    pub debrief_success: String,
    pub debrief_fail: String,
    pub cliffhanger: String,
}

impl Default for StoryPolicy {
    fn default() -> Self {
        Self {
            briefing: "A new mission awaits. Ready up!".to_string(),
            debrief_success: "Mission accomplished. Well done!".to_string(),
            debrief_fail: "Mission failed. Regroup and try again.".to_string(),
            cliffhanger: "But something stirs in the next world...".to_string(),
        }
    }
}

/// A complete, versioned world policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default = "default_policy_version")]
    pub policy_version: String,
    pub world: World,
    #[serde(default)]
    pub mission: MissionPolicy,
    #[serde(default)]
    pub zpd: ZpdPolicy,
    #[serde(default)]
    pub risk_guard: RiskGuardPolicy,
    #[serde(default)]
    pub points: PointsPolicy,
    #[serde(default)]
    pub team: TeamPolicy,
    #[serde(default)]
    pub story: StoryPolicy,
}

impl Policy {
    /// The built-in default policy for a world.
    ///
    /// Used both to seed [`StaticPolicies`] and as the fallback when a
    /// policy lookup fails at request time.
    pub fn default_for(world: World) -> Self {
        Self {
            policy_version: default_policy_version(),
            world,
            mission: MissionPolicy::default(),
            zpd: ZpdPolicy::default(),
            risk_guard: RiskGuardPolicy::default(),
            points: PointsPolicy::default(),
            team: TeamPolicy::default(),
            story: StoryPolicy {
                briefing: format!("Welcome to the {world} world. A new mission awaits!"),
                ..StoryPolicy::default()
            },
        }
    }

    /// Check internal consistency of the policy.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: String| PolicyError::Invalid {
            world: self.world,
            reason,
        };

        if self.mission.total_quests == 0 {
            return Err(invalid("total_quests must be at least 1".into()));
        }
        for &idx in self.mission.risk_at.iter().chain(&self.mission.team_at) {
            if idx == 0 || idx > self.mission.total_quests {
                return Err(invalid(format!(
                    "special quest index {idx} outside 1..={}",
                    self.mission.total_quests
                )));
            }
        }
        if self.team.half_threshold > self.team.triple_threshold {
            return Err(invalid("half_threshold above triple_threshold".into()));
        }
        Ok(())
    }
}

/// Policy lookup boundary, keyed by world.
pub trait PolicyStore: Send + Sync {
    fn policy_for(&self, world: World) -> Result<Policy, PolicyError>;
}

/// In-memory policy set, pre-seeded with defaults for every world.
#[derive(Debug, Clone)]
pub struct StaticPolicies {
    policies: HashMap<World, Policy>,
}

impl StaticPolicies {
    /// Build a store holding [`Policy::default_for`] each world.
    pub fn with_defaults() -> Self {
        let policies = World::ALL
            .into_iter()
            .map(|w| (w, Policy::default_for(w)))
            .collect();
        Self { policies }
    }

    /// Replace or add a policy.
    pub fn insert(&mut self, policy: Policy) {
        self.policies.insert(policy.world, policy);
    }
}

impl Default for StaticPolicies {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PolicyStore for StaticPolicies {
    fn policy_for(&self, world: World) -> Result<Policy, PolicyError> {
        self.policies
            .get(&world)
            .cloned()
            .ok_or(PolicyError::Unknown(world))
    }
}

/// Loads `{world}.toml` policies from a directory, caching parsed results.
pub struct TomlPolicyDir {
    dir: PathBuf,
    cache: Mutex<HashMap<World, Policy>>,
}

impl TomlPolicyDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop cached policies so edited files are picked up.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("policy cache poisoned").clear();
    }

    fn load(&self, world: World) -> Result<Policy, PolicyError> {
        let path = self.dir.join(format!("{world}.toml"));
        let raw = std::fs::read_to_string(&path).map_err(|source| PolicyError::Io {
            path: path.clone(),
            source,
        })?;
        let policy: Policy = toml::from_str(&raw).map_err(|source| PolicyError::Parse {
            path: path.clone(),
            source,
        })?;
        if policy.world != world {
            return Err(PolicyError::WorldMismatch {
                path,
                expected: world,
                found: policy.world,
            });
        }
        policy.validate()?;
        Ok(policy)
    }
}

impl PolicyStore for TomlPolicyDir {
    fn policy_for(&self, world: World) -> Result<Policy, PolicyError> {
        if let Some(policy) = self
            .cache
            .lock()
            .expect("policy cache poisoned")
            .get(&world)
        {
            return Ok(policy.clone());
        }
        let policy = self.load(world)?;
        self.cache
            .lock()
            .expect("policy cache poisoned")
            .insert(world, policy.clone());
        Ok(policy)
    }
}
