//! Rubric - scores one answer attempt and derives behavioral signals.
//!
//! Pure functions of the attempt context and the history passed in; no
//! side effects, no clocks, no randomness, so identical inputs always
//! produce identical scores and feedback.

use quest_rules::{ChallengeOutcome, QuestKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::hypothesis::HypothesisSignals;
use crate::progress::AttemptRecord;

/// Number of trailing attempts (current included) that must all be
/// implausibly fast before the guess-pattern signal fires from history.
const GUESS_WINDOW: usize = 3;

/// Rolling window for the fatigue comparison against the earlier session.
const FATIGUE_WINDOW: usize = 5;

/// Answers slower than this suggest a tired learner.
const SLOW_ANSWER_MS: u64 = 60_000;

/// Minimum plausible think time per quest kind.
pub fn min_think_time_ms(kind: QuestKind) -> u64 {
    match kind {
        QuestKind::Standard => 3_000,
        QuestKind::Risk => 5_000,
        QuestKind::Team => 4_000,
    }
}

/// Client device classes reported with telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Unknown,
    Desktop,
    Mobile,
}

/// Behavioral counters captured by the client for one attempt.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Telemetry {
    pub clicks: u32,
    pub focus_lost: u32,
    pub retries: u32,
    pub device: Device,
    /// Free-form extras forwarded by the client, not interpreted here.
    #[serde(default)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Behavioral signals derived from one scored attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Signals {
    /// Suggested difficulty delta in {-1, 0, 1}.
    pub difficulty_adj: i8,
    pub fatigue: bool,
    pub guess_pattern: bool,
}

/// Everything the rubric needs to know about one submitted answer.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    pub kind: QuestKind,
    pub correct: bool,
    pub time_ms: u64,
    pub help_used: bool,
    pub challenge: ChallengeOutcome,
    pub telemetry: Telemetry,
}

/// Output of [`Rubric::score`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricResult {
    /// Normalized score in [0, 1].
    pub score: f64,
    pub feedback: String,
    pub signals: Signals,
}

/// The answer scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rubric;

impl Rubric {
    pub fn new() -> Self {
        Self
    }

    /// Score one attempt against its context and the prior history.
    pub fn score(&self, ctx: &AttemptContext, history: &[AttemptRecord]) -> RubricResult {
        let mut score: f64 = if ctx.correct { 1.0 } else { 0.0 };
        let mut signals = Signals::default();

        if ctx.correct {
            if ctx.help_used {
                score *= 0.8;
            }
            if ctx.time_ms < min_think_time_ms(ctx.kind) {
                signals.guess_pattern = true;
                score *= 0.9;
            } else if ctx.time_ms > SLOW_ANSWER_MS {
                signals.fatigue = true;
            }
        }

        match ctx.challenge {
            ChallengeOutcome::Success => score = (score + 0.2).min(1.0),
            ChallengeOutcome::Fail => score = 0.0,
            ChallengeOutcome::None => {}
        }

        if rapid_streak(ctx, history) {
            signals.guess_pattern = true;
        }
        if correctness_declining(history) {
            signals.fatigue = true;
        }
        analyze_telemetry(ctx, &mut signals);

        signals.difficulty_adj = difficulty_adjustment(score, &signals);

        RubricResult {
            score,
            feedback: feedback_text(ctx),
            signals,
        }
    }
}

/// The guess-pattern window: the current attempt plus the most recent
/// history entries all completed faster than their kind's minimum think
/// time.
fn rapid_streak(ctx: &AttemptContext, history: &[AttemptRecord]) -> bool {
    if ctx.time_ms >= min_think_time_ms(ctx.kind) || history.len() < GUESS_WINDOW - 1 {
        return false;
    }
    history
        .iter()
        .rev()
        .take(GUESS_WINDOW - 1)
        .all(|a| a.time_ms < min_think_time_ms(a.kind))
}

/// Fatigue from history: the correctness rate over the last
/// [`FATIGUE_WINDOW`] attempts dropped well below the earlier session rate.
fn correctness_declining(history: &[AttemptRecord]) -> bool {
    if history.len() < FATIGUE_WINDOW * 2 {
        return false;
    }
    let (earlier, recent) = history.split_at(history.len() - FATIGUE_WINDOW);
    let rate = |attempts: &[AttemptRecord]| {
        attempts.iter().filter(|a| a.correct).count() as f64 / attempts.len() as f64
    };
    let earlier_rate = rate(earlier);
    earlier_rate > 0.0 && rate(recent) < earlier_rate * 0.6
}

fn analyze_telemetry(ctx: &AttemptContext, signals: &mut Signals) {
    let telemetry = &ctx.telemetry;
    if telemetry.clicks > 5 {
        signals.guess_pattern = true;
    }
    if telemetry.focus_lost > 3 || telemetry.retries > 2 {
        signals.fatigue = true;
    }
    // Mobile users legitimately answer slower.
    if telemetry.device == Device::Mobile && ctx.time_ms > 30_000 {
        signals.fatigue = false;
    }
}

fn difficulty_adjustment(score: f64, signals: &Signals) -> i8 {
    if score < 0.5 || signals.fatigue {
        -1
    } else if score >= 0.9 && !signals.guess_pattern {
        1
    } else {
        0
    }
}

fn feedback_text(ctx: &AttemptContext) -> String {
    if ctx.challenge == ChallengeOutcome::Fail {
        return "Challenge failed. Shake it off - next time!".to_string();
    }
    let mut text = if ctx.correct {
        if ctx.time_ms < 10_000 {
            "Correct, and quick. Keep it up!"
        } else {
            "Correct! You are on the right track."
        }
    } else {
        "Not quite. Take a breath and look at the details again."
    }
    .to_string();
    if ctx.challenge == ChallengeOutcome::Success {
        text.push_str(" Challenge cleared!");
    }
    text
}

/// Fold a full history into the rolling signals the planner consumes.
pub fn aggregate_signals(history: &[AttemptRecord]) -> HypothesisSignals {
    if history.is_empty() {
        return HypothesisSignals::default();
    }

    let total = history.len() as f64;
    let score_avg = history.iter().map(|a| a.score).sum::<f64>() / total;
    let help_rate = history.iter().filter(|a| a.help_used).count() as f64 / total;

    let difficulty_adj = if score_avg < 0.55 || help_rate > 0.25 {
        -1
    } else if score_avg > 0.82 && help_rate < 0.1 {
        1
    } else {
        0
    };

    let slow = history.iter().filter(|a| a.time_ms > SLOW_ANSWER_MS).count() as f64;
    let rapid = history
        .iter()
        .filter(|a| a.time_ms < min_think_time_ms(a.kind))
        .count() as f64;

    HypothesisSignals {
        score_avg,
        help_rate,
        difficulty_adj,
        fatigue: slow / total > 0.3,
        guess_pattern: rapid / total > 0.3,
    }
}
