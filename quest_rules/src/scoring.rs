//! Points engine: converts a scored attempt into an integer point delta.
//!
//! The engine computes the *raw* per-attempt delta only. The session-level
//! team multiplier is owned by the rule evaluator; [`team_multiplier`] is
//! exposed here as the policy's rate-to-multiplier table.

use serde::{Deserialize, Serialize};

use crate::policy::{PointsPolicy, TeamPolicy};
use crate::quests::{ChallengeOutcome, QuestKind};

/// Elapsed time below which a correct answer earns a time bonus.
const TIME_BONUS_CUTOFF_MS: u64 = 10_000;

/// Attempt context feeding the point computation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PointsContext {
    pub correct: bool,
    pub time_ms: u64,
    pub help_used: bool,
    pub challenge: ChallengeOutcome,
    /// Length of the current run of implausibly fast answers, this one
    /// included. 0 or 1 means no diminishing returns apply.
    pub rapid_count: u32,
}

/// Deterministic point calculator configured from a world policy.
#[derive(Debug, Clone)]
pub struct PointsEngine {
    policy: PointsPolicy,
}

impl PointsEngine {
    pub fn new(policy: PointsPolicy) -> Self {
        Self { policy }
    }

    /// Base points for a quest kind.
    pub fn base_points(&self, kind: QuestKind) -> i64 {
        match kind {
            QuestKind::Standard => self.policy.standard,
            QuestKind::Risk => self.policy.risk,
            QuestKind::Team => self.policy.team,
        }
    }

    /// Compute the raw point delta for one attempt.
    ///
    /// Rounded to the nearest integer, never negative. Identical inputs
    /// always yield the identical delta.
    pub fn compute(&self, kind: QuestKind, score: f64, ctx: &PointsContext) -> i64 {
        let base = self.base_points(kind) as f64;

        let score_multiplier = score.clamp(0.5, 1.0);
        let mut total = base * score_multiplier;

        if score >= 1.0 && !ctx.help_used {
            total *= 1.2;
        }

        if ctx.correct && ctx.time_ms < TIME_BONUS_CUTOFF_MS {
            let bonus = 50 - (ctx.time_ms / 200) as i64;
            total += bonus.max(0) as f64;
        }

        if ctx.challenge == ChallengeOutcome::Success {
            total += 100.0;
        }

        if ctx.rapid_count > 1 {
            let reduction = (f64::from(ctx.rapid_count - 1) * 0.10).min(0.5);
            total *= 1.0 - reduction;
        }

        total.round().max(0.0) as i64
    }

    /// Bonus minigame award. Nothing on failure.
    pub fn bonus_game_points(&self, success: bool) -> i64 {
        if success {
            self.policy.bonus_minigame.points
        } else {
            0
        }
    }
}

/// Additive streak bonus, separate from per-quest points.
pub fn streak_bonus(streak: u32) -> i64 {
    match streak {
        0..=2 => 0,
        3..=4 => 50,
        5..=9 => 100,
        _ => 200,
    }
}

/// The team-success-rate multiplier ladder.
///
/// Informational table; the authoritative x3 session multiplier is applied
/// by the rule evaluator's final-points rule.
pub fn team_multiplier(success_rate: f64, policy: &TeamPolicy) -> f64 {
    if success_rate > policy.triple_threshold {
        3.0
    } else if success_rate > policy.half_threshold {
        1.5
    } else {
        1.0
    }
}
