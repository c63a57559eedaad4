//! Executor ("System 1") - the per-answer pipeline.
//!
//! Scores one submitted answer, banks points, appends the attempt to
//! progress, records facts, and hands a convergence hint back to the
//! planner. Gating (may the user proceed) is delegated to the rule
//! evaluator and re-checked before every question transition.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use quest_rules::{
    streak_bonus, ChallengeOutcome, MissionId, Policy, PointsContext, PointsEngine, PolicyStore,
    QuestId, QuestKind, SessionKey, UserId, World,
};

use crate::error::EngineError;
use crate::facts::{Fact, FactStore};
use crate::hypothesis::HypothesisSignals;
use crate::planner::{phase_of, MissionPhase};
use crate::progress::{AttemptRecord, ProgressStore};
use crate::rubric::{aggregate_signals, min_think_time_ms, AttemptContext, Rubric, Signals, Telemetry};
use crate::rules::{MissionStatus, Query, RuleEvaluator, RuleSet};

/// Feedback from the executor to the adaptive planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergeHint {
    Raise,
    Lower,
    Keep,
}

/// The submitted answer for one quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalAnswer {
    pub selected_option: Option<String>,
    pub correct: bool,
    pub time_ms: u64,
    #[serde(default)]
    pub help_used: bool,
    #[serde(default)]
    pub challenge: ChallengeOutcome,
}

/// One answer-evaluation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalRequest {
    pub user: UserId,
    pub mission: MissionId,
    pub world: World,
    pub quest_id: QuestId,
    /// 1-based quest position, as planned.
    pub quest_index: u32,
    pub kind: QuestKind,
    pub answer: EvalAnswer,
    #[serde(default)]
    pub telemetry: Telemetry,
}

/// Scoring result returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResponse {
    pub feedback: String,
    /// Raw per-quest point delta.
    pub point_delta: i64,
    /// Additive streak bonus banked alongside the delta.
    pub streak_bonus: i64,
    pub signals: Signals,
    pub converge_hint: ConvergeHint,
}

/// Outcome of a gating check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub status: MissionStatus,
    /// Index of the next permitted question. 1 after a reset.
    pub next_question: u32,
    /// Names of the rules that fired, in evaluation order.
    pub fired: Vec<String>,
    pub phase: Option<MissionPhase>,
}

/// Mission statistics with aggregate behavioral signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionStats {
    pub total_attempts: usize,
    pub correct_attempts: usize,
    pub score_avg: f64,
    pub help_rate: f64,
    pub lives: u32,
    pub points: i64,
    pub question_index: u32,
    pub streak: u32,
    pub finished: bool,
    pub success: bool,
    pub aggregate: HypothesisSignals,
}

/// Reward from the bonus minigame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BonusOutcome {
    pub points: i64,
    pub lives: u32,
}

/// The per-answer evaluator.
pub struct Executor {
    rubric: Rubric,
    policies: Arc<dyn PolicyStore>,
    progress: Arc<ProgressStore>,
    facts: Arc<FactStore>,
    evaluator: Arc<dyn RuleEvaluator>,
    rules: RuleSet,
}

impl Executor {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        progress: Arc<ProgressStore>,
        facts: Arc<FactStore>,
        evaluator: Arc<dyn RuleEvaluator>,
        rules: RuleSet,
    ) -> Self {
        Self {
            rubric: Rubric::new(),
            policies,
            progress,
            facts,
            evaluator,
            rules,
        }
    }

    /// Score one answer: rubric, points, progress append, facts, hint.
    ///
    /// A missing progress record does not abort the call; the attempt is
    /// scored and returned anyway, and the append failure is logged with
    /// the session key.
    pub fn evaluate(&self, req: &EvalRequest) -> Result<EvalResponse, EngineError> {
        if !req.user.is_valid() {
            return Err(EngineError::validation("eval request lacks a user id"));
        }
        if !req.mission.is_valid() {
            return Err(EngineError::validation("eval request lacks a mission id"));
        }
        if !req.quest_id.is_valid() {
            return Err(EngineError::validation("eval request lacks a quest id"));
        }

        let key = SessionKey::new(req.user.clone(), req.mission.clone());
        let prior = self.progress.get(&key);
        let history = prior.as_ref().map(|r| r.history.as_slice()).unwrap_or(&[]);

        let ctx = AttemptContext {
            kind: req.kind,
            correct: req.answer.correct,
            time_ms: req.answer.time_ms,
            help_used: req.answer.help_used,
            challenge: req.answer.challenge,
            telemetry: req.telemetry.clone(),
        };
        let scored = self.rubric.score(&ctx, history);

        let points = PointsEngine::new(self.policy_or_default(req.world, &key).points);
        let rapid = req.answer.time_ms < min_think_time_ms(req.kind);
        let rapid_count = if rapid {
            prior.as_ref().map(|r| r.rapid_run_len()).unwrap_or(0) + 1
        } else {
            0
        };
        let delta = points.compute(
            req.kind,
            scored.score,
            &PointsContext {
                correct: req.answer.correct,
                time_ms: req.answer.time_ms,
                help_used: req.answer.help_used,
                challenge: req.answer.challenge,
                rapid_count,
            },
        );

        let prior_streak = prior.as_ref().map(|r| r.streak()).unwrap_or(0);
        let banked_streak_bonus = if req.answer.correct {
            streak_bonus(prior_streak + 1) - streak_bonus(prior_streak)
        } else {
            0
        };

        let attempt = AttemptRecord {
            quest_id: req.quest_id.clone(),
            kind: req.kind,
            selected_option: req.answer.selected_option.clone(),
            correct: req.answer.correct,
            time_ms: req.answer.time_ms,
            score: scored.score,
            point_delta: delta,
            streak_bonus: banked_streak_bonus,
            help_used: req.answer.help_used,
            challenge: req.answer.challenge,
            telemetry: req.telemetry.clone(),
            attempted_at: Utc::now(),
        };

        let question_index = match self.progress.append_attempt(&key, attempt) {
            Ok(record) => Some(record.question_index),
            Err(err) => {
                // Append failures never block the scoring response.
                warn!(session = %key, error = %err, "attempt scored but not persisted");
                None
            }
        };

        self.facts.assert_fact(Fact::attempt(
            key.clone(),
            req.quest_index,
            req.kind,
            req.answer.correct,
            Utc::now(),
        ));
        match req.answer.challenge {
            ChallengeOutcome::Success => {
                self.facts
                    .assert_fact(Fact::challenge(key.clone(), req.quest_index, true));
            }
            ChallengeOutcome::Fail => {
                self.facts
                    .assert_fact(Fact::challenge(key.clone(), req.quest_index, false));
            }
            ChallengeOutcome::None => {}
        }
        if let Some(index) = question_index {
            self.facts
                .assert_fact(Fact::current_index(key.clone(), index));
        }

        let converge_hint = converge_hint(scored.score, &scored.signals);
        info!(
            session = %key,
            quest = %req.quest_id,
            score = scored.score,
            delta,
            hint = ?converge_hint,
            "attempt evaluated"
        );

        Ok(EvalResponse {
            feedback: scored.feedback,
            point_delta: delta,
            streak_bonus: banked_streak_bonus,
            signals: scored.signals,
            converge_hint,
        })
    }

    /// Gate the next question transition on the rule evaluator's verdict.
    ///
    /// Evaluation errors fail closed: in-progress, no advance. A passed or
    /// reset verdict also settles the bookkeeping record (the state
    /// machine's completed transitions).
    pub fn gate(&self, user: &UserId, mission: &MissionId) -> Result<GateDecision, EngineError> {
        let key = SessionKey::new(user.clone(), mission.clone());
        let facts = self.facts.session_view(&key);

        let (status, fired) = match self.evaluator.evaluate(&facts, &self.rules, Query::Status) {
            Ok(eval) => {
                let status = eval.status().unwrap_or_default();
                (status, eval.fired)
            }
            Err(err) => {
                warn!(session = %key, error = %err, "status evaluation failed; failing closed");
                (MissionStatus::InProgress, Vec::new())
            }
        };

        let record = self.progress.get(&key);
        let fallback_index = record.as_ref().map(|r| r.question_index).unwrap_or(1);
        let next_question = match self.evaluator.evaluate(&facts, &self.rules, Query::NextQuestion)
        {
            Ok(eval) => eval
                .first_int()
                .map(|n| n.max(1) as u32)
                .unwrap_or(fallback_index),
            Err(err) => {
                warn!(session = %key, error = %err, "next-question evaluation failed; no advance");
                fallback_index
            }
        };

        if let Some(current) = &record {
            if !current.finished {
                if status == MissionStatus::Passed {
                    self.progress.finish(&key, true)?;
                } else if status.is_reset() || current.lives == 0 {
                    self.progress.finish(&key, false)?;
                }
            }
        }

        let phase = self
            .progress
            .get(&key)
            .map(|record| phase_of(&record, status));

        info!(session = %key, %status, next_question, "gate decided");

        Ok(GateDecision {
            status,
            next_question,
            fired,
            phase,
        })
    }

    /// Mission statistics with aggregate signals for the planner.
    pub fn get_stats(
        &self,
        user: &UserId,
        mission: &MissionId,
    ) -> Result<MissionStats, EngineError> {
        let key = SessionKey::new(user.clone(), mission.clone());
        let record = self
            .progress
            .get(&key)
            .ok_or_else(|| EngineError::not_found("progress", &key))?;

        let stats = record.stats();
        Ok(MissionStats {
            total_attempts: stats.total_attempts,
            correct_attempts: stats.correct_attempts,
            score_avg: stats.score_avg,
            help_rate: stats.help_rate,
            lives: record.lives,
            points: record.points,
            question_index: record.question_index,
            streak: record.streak(),
            finished: record.finished,
            success: record.success,
            aggregate: aggregate_signals(&record.history),
        })
    }

    /// Ordered names of the rules behind the current status verdict.
    pub fn explain(&self, user: &UserId, mission: &MissionId) -> Result<Vec<String>, EngineError> {
        let key = SessionKey::new(user.clone(), mission.clone());
        let facts = self.facts.session_view(&key);
        let eval = self.evaluator.evaluate(&facts, &self.rules, Query::Status)?;
        Ok(eval.fired)
    }

    /// Settle a bonus minigame: flat points and an extra life, capped.
    pub fn bonus_game(
        &self,
        user: &UserId,
        mission: &MissionId,
        world: World,
        success: bool,
    ) -> Result<BonusOutcome, EngineError> {
        let key = SessionKey::new(user.clone(), mission.clone());
        let policy = self.policy_or_default(world, &key);
        let points = PointsEngine::new(policy.points.clone()).bonus_game_points(success);

        let record = if success {
            self.progress.award_bonus(
                &key,
                points,
                policy.points.bonus_minigame.life_plus,
                policy.points.bonus_minigame.life_cap,
            )?
        } else {
            self.progress
                .get(&key)
                .ok_or_else(|| EngineError::not_found("progress", &key))?
        };

        Ok(BonusOutcome {
            points,
            lives: record.lives,
        })
    }

    fn policy_or_default(&self, world: World, session: &SessionKey) -> Policy {
        self.policies.policy_for(world).unwrap_or_else(|err| {
            warn!(%world, %session, error = %err, "policy lookup failed; using built-in default");
            Policy::default_for(world)
        })
    }
}

fn converge_hint(score: f64, signals: &Signals) -> ConvergeHint {
    if score > 0.85 && !signals.fatigue && !signals.guess_pattern {
        ConvergeHint::Raise
    } else if score < 0.55 || signals.fatigue {
        ConvergeHint::Lower
    } else {
        ConvergeHint::Keep
    }
}
