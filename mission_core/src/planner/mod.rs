//! Planner ("System 2") - composes quest sequences from world policies and
//! adapts difficulty from the signals the executor feeds back.

mod templates;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use quest_rules::{
    Difficulty, MissionId, Policy, PolicyStore, Quest, QuestId, QuestKind, QuestOption,
    RiskConfig, SessionKey, UserId, World,
};

use crate::error::EngineError;
use crate::facts::{Fact, FactStore};
use crate::hypothesis::{Hypothesis, HypothesisId, HypothesisStore, SignalUpdate};
use crate::progress::ProgressRecord;
use crate::progress::ProgressStore;
use crate::rules::MissionStatus;

use templates::templates_for;

/// Lifecycle states of one mission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPhase {
    Planned,
    Active,
    CompletedSuccess,
    CompletedFail,
}

/// Derive the phase from bookkeeping plus the evaluator's gating status.
pub fn phase_of(record: &ProgressRecord, status: MissionStatus) -> MissionPhase {
    if record.finished {
        return if record.success {
            MissionPhase::CompletedSuccess
        } else {
            MissionPhase::CompletedFail
        };
    }
    if status == MissionStatus::Passed {
        return MissionPhase::CompletedSuccess;
    }
    if record.lives == 0 {
        return MissionPhase::CompletedFail;
    }
    if record.history.is_empty() {
        MissionPhase::Planned
    } else {
        MissionPhase::Active
    }
}

/// The learning goal of a plan request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanGoal {
    pub mission: MissionId,
    pub world: World,
}

/// Optional caller context for planning.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlanContext {
    /// Overrides the recommended starting difficulty.
    pub difficulty: Option<Difficulty>,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub user: UserId,
    pub goal: PlanGoal,
    #[serde(default)]
    pub context: PlanContext,
}

/// A composed mission plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanResponse {
    pub hypothesis_id: HypothesisId,
    pub briefing: String,
    pub quests: Vec<Quest>,
    pub debrief_success: String,
    pub debrief_fail: String,
    pub cliffhanger: String,
}

/// The orchestrator.
pub struct Planner {
    policies: Arc<dyn PolicyStore>,
    hypotheses: Arc<HypothesisStore>,
    progress: Arc<ProgressStore>,
    facts: Arc<FactStore>,
}

impl Planner {
    pub fn new(
        policies: Arc<dyn PolicyStore>,
        hypotheses: Arc<HypothesisStore>,
        progress: Arc<ProgressStore>,
        facts: Arc<FactStore>,
    ) -> Self {
        Self {
            policies,
            hypotheses,
            progress,
            facts,
        }
    }

    /// Compose a quest sequence and a fresh hypothesis for a mission.
    ///
    /// Replaying `plan` for an in-flight mission refreshes quests and
    /// hypothesis but never clobbers existing progress.
    pub fn plan(&self, req: &PlanRequest) -> Result<PlanResponse, EngineError> {
        if !req.user.is_valid() {
            return Err(EngineError::validation("plan request lacks a user id"));
        }
        if !req.goal.mission.is_valid() {
            return Err(EngineError::validation(
                "plan goal lacks a mission identifier",
            ));
        }

        let policy = self.policy_or_default(req.goal.world, &req.user);

        let (difficulty, zpd_note) = match req.context.difficulty {
            Some(requested) => (requested, format!("difficulty {requested} requested by caller")),
            None => {
                let history = self.progress.user_history(&req.user);
                recommend_difficulty(&history, policy.zpd.start)
            }
        };

        let quests = compose_quests(&policy, &req.goal.mission, req.goal.world);

        let hypothesis = self.hypotheses.create(
            req.user.clone(),
            req.goal.mission.clone(),
            req.goal.world,
            difficulty,
        );
        self.hypotheses
            .add_note(hypothesis.id, format!("zpd: {zpd_note}"))?;

        self.progress.start(
            req.user.clone(),
            req.goal.mission.clone(),
            policy.mission.lives_start,
        );

        let session = SessionKey::new(req.user.clone(), req.goal.mission.clone());
        let mut plan_facts = vec![Fact::required_count(
            session.clone(),
            policy.mission.total_quests,
        )];
        for &index in &policy.mission.risk_at {
            plan_facts.push(Fact::risk_index(session.clone(), index));
        }
        for &index in &policy.mission.team_at {
            plan_facts.push(Fact::team_index(session.clone(), index));
        }
        self.facts.assert_all(plan_facts);

        info!(
            user = %req.user,
            mission = %req.goal.mission,
            world = %req.goal.world,
            %difficulty,
            quests = quests.len(),
            "mission planned"
        );

        Ok(PlanResponse {
            hypothesis_id: hypothesis.id,
            briefing: policy.story.briefing,
            quests,
            debrief_success: policy.story.debrief_success,
            debrief_fail: policy.story.debrief_fail,
            cliffhanger: policy.story.cliffhanger,
        })
    }

    /// Fold evaluation signals into a hypothesis.
    ///
    /// Fails with a not-found error for unknown hypothesis IDs; difficulty
    /// moves at most one step per call.
    pub fn update(
        &self,
        id: HypothesisId,
        update: &SignalUpdate,
    ) -> Result<Hypothesis, EngineError> {
        let updated = self.hypotheses.update(id, update)?;
        info!(
            hypothesis = %id,
            difficulty = %updated.difficulty,
            "hypothesis updated"
        );
        Ok(updated)
    }

    /// Read-only hypothesis snapshot.
    pub fn hypothesis(&self, id: HypothesisId) -> Option<Hypothesis> {
        self.hypotheses.get(id)
    }

    fn policy_or_default(&self, world: World, user: &UserId) -> Policy {
        self.policies.policy_for(world).unwrap_or_else(|err| {
            warn!(%world, %user, error = %err, "policy lookup failed; using built-in default");
            Policy::default_for(world)
        })
    }
}

/// Compose the ordered quest list dictated by the policy.
fn compose_quests(policy: &Policy, mission: &MissionId, world: World) -> Vec<Quest> {
    let bank = templates_for(world);
    (1..=policy.mission.total_quests)
        .map(|index| {
            let kind = if policy.mission.risk_at.contains(&index) {
                QuestKind::Risk
            } else if policy.mission.team_at.contains(&index) {
                QuestKind::Team
            } else {
                QuestKind::Standard
            };

            let (risk, challenge_id) = if kind == QuestKind::Risk {
                (
                    Some(RiskConfig {
                        max_attempts: policy.risk_guard.max_attempts,
                        cooldown_ms: policy.risk_guard.cooldown_ms,
                    }),
                    policy.risk_guard.challenge_ids.get(&format!("q{index}")).cloned(),
                )
            } else {
                (None, None)
            };

            let template = &bank[(index as usize - 1) % bank.len()];
            let options = template
                .options
                .iter()
                .enumerate()
                .map(|(slot, (text, correct))| {
                    QuestOption::new(
                        char::from(b'a' + slot as u8).to_string(),
                        *text,
                        *correct,
                    )
                })
                .collect();

            Quest {
                id: QuestId::composed(mission, index),
                index,
                world,
                kind,
                prompt: template.prompt.to_string(),
                options,
                challenge_id,
                risk,
            }
        })
        .collect()
}

/// Pick a starting difficulty from the user's mission history.
///
/// Zone-of-proximal-development bands: newcomers and strugglers start
/// easy, proven high performers start hard, everyone else gets the
/// policy's default.
fn recommend_difficulty(
    history: &[ProgressRecord],
    fallback: Difficulty,
) -> (Difficulty, String) {
    let completed = history.iter().filter(|r| r.finished && r.success).count();
    if completed < 3 {
        return (
            Difficulty::Easy,
            format!("{completed} missions completed; starting gently"),
        );
    }

    let recent: Vec<&ProgressRecord> = history.iter().take(5).collect();
    let recent_finished = recent.iter().filter(|r| r.finished).count();
    let success_rate = if recent_finished > 0 {
        recent.iter().filter(|r| r.finished && r.success).count() as f64 / recent_finished as f64
    } else {
        0.0
    };

    let attempts: Vec<_> = recent.iter().flat_map(|r| r.history.iter()).collect();
    let (avg_score, help_rate) = if attempts.is_empty() {
        (0.0, 0.0)
    } else {
        let total = attempts.len() as f64;
        (
            attempts.iter().map(|a| a.score).sum::<f64>() / total,
            attempts.iter().filter(|a| a.help_used).count() as f64 / total,
        )
    };

    if success_rate < 0.5 {
        return (
            Difficulty::Easy,
            format!("recent success rate {success_rate:.2} below 0.5"),
        );
    }
    if help_rate > 0.3 {
        return (
            Difficulty::Easy,
            format!("help rate {help_rate:.2} above 0.3"),
        );
    }
    if completed >= 10 && success_rate >= 0.8 && avg_score >= 0.85 && help_rate < 0.1 {
        return (
            Difficulty::Hard,
            format!("{completed} missions completed with avg score {avg_score:.2}"),
        );
    }

    (fallback, format!("policy default {fallback}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quest_rules::{ChallengeOutcome, PolicyError, StaticPolicies};

    use crate::progress::AttemptRecord;
    use crate::rubric::Telemetry;
    use chrono::Utc;

    struct NoPolicies;

    impl PolicyStore for NoPolicies {
        fn policy_for(&self, world: World) -> Result<Policy, PolicyError> {
            Err(PolicyError::Unknown(world))
        }
    }

    fn planner_with(policies: Arc<dyn PolicyStore>) -> (Planner, Arc<ProgressStore>, Arc<FactStore>) {
        let progress = Arc::new(ProgressStore::new());
        let facts = Arc::new(FactStore::new());
        let planner = Planner::new(
            policies,
            Arc::new(HypothesisStore::new()),
            Arc::clone(&progress),
            Arc::clone(&facts),
        );
        (planner, progress, facts)
    }

    fn request(user: &str, mission: &str) -> PlanRequest {
        PlanRequest {
            user: UserId::new(user),
            goal: PlanGoal {
                mission: MissionId::new(mission),
                world: World::It,
            },
            context: PlanContext::default(),
        }
    }

    #[test]
    fn test_plan_rejects_missing_identifiers() {
        let (planner, _, _) = planner_with(Arc::new(StaticPolicies::with_defaults()));

        let err = planner.plan(&request("", "m1")).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = planner.plan(&request("u1", "  ")).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_plan_places_special_quests_per_policy() {
        let (planner, _, _) = planner_with(Arc::new(StaticPolicies::with_defaults()));
        let response = planner.plan(&request("u1", "m1")).unwrap();

        assert_eq!(response.quests.len(), 10);
        assert_eq!(response.quests[4].kind, QuestKind::Risk);
        assert_eq!(response.quests[9].kind, QuestKind::Risk);
        assert_eq!(response.quests[8].kind, QuestKind::Team);
        assert_eq!(response.quests[0].kind, QuestKind::Standard);

        assert!(response.quests[4].risk.is_some());
        assert!(response.quests[0].risk.is_none());
        assert_eq!(response.quests[0].id.as_str(), "m1_q1");
        assert_eq!(response.quests[0].index, 1);
    }

    #[test]
    fn test_plan_seeds_progress_and_plan_facts() {
        let (planner, progress, facts) = planner_with(Arc::new(StaticPolicies::with_defaults()));
        planner.plan(&request("u1", "m1")).unwrap();

        let key = SessionKey::new(UserId::new("u1"), MissionId::new("m1"));
        let record = progress.get(&key).unwrap();
        assert_eq!(record.lives, 3);
        assert_eq!(record.question_index, 1);

        // required_count + two risk indexes + one team index.
        assert_eq!(facts.fact_count(&key), 4);
    }

    #[test]
    fn test_plan_survives_policy_outage_with_default() {
        let (planner, _, _) = planner_with(Arc::new(NoPolicies));
        let response = planner.plan(&request("u1", "m1")).unwrap();
        assert_eq!(response.quests.len(), 10);
    }

    #[test]
    fn test_replay_keeps_existing_progress() {
        let (planner, progress, _) = planner_with(Arc::new(StaticPolicies::with_defaults()));
        planner.plan(&request("u1", "m1")).unwrap();

        let key = SessionKey::new(UserId::new("u1"), MissionId::new("m1"));
        progress
            .append_attempt(
                &key,
                AttemptRecord {
                    quest_id: QuestId::new("m1_q1"),
                    kind: QuestKind::Standard,
                    selected_option: Some("a".into()),
                    correct: true,
                    time_ms: 7_000,
                    score: 1.0,
                    point_delta: 200,
                    streak_bonus: 0,
                    help_used: false,
                    challenge: ChallengeOutcome::None,
                    telemetry: Telemetry::default(),
                    attempted_at: Utc::now(),
                },
            )
            .unwrap();

        planner.plan(&request("u1", "m1")).unwrap();
        let record = progress.get(&key).unwrap();
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.question_index, 2);
    }

    #[test]
    fn test_caller_difficulty_override_wins() {
        let (planner, _, _) = planner_with(Arc::new(StaticPolicies::with_defaults()));
        let mut req = request("u1", "m1");
        req.context.difficulty = Some(Difficulty::Hard);
        let response = planner.plan(&req).unwrap();
        let hypothesis = planner.hypothesis(response.hypothesis_id).unwrap();
        assert_eq!(hypothesis.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_newcomer_recommendation_is_easy() {
        let (difficulty, reason) = recommend_difficulty(&[], Difficulty::Medium);
        assert_eq!(difficulty, Difficulty::Easy);
        assert!(reason.contains("starting gently"));
    }

    #[test]
    fn test_update_unknown_hypothesis() {
        let (planner, _, _) = planner_with(Arc::new(StaticPolicies::with_defaults()));
        let err = planner
            .update(HypothesisId::new(), &SignalUpdate::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_update_moves_difficulty_one_step() {
        let (planner, _, _) = planner_with(Arc::new(StaticPolicies::with_defaults()));
        let mut req = request("u1", "m1");
        req.context.difficulty = Some(Difficulty::Medium);
        let response = planner.plan(&req).unwrap();

        let updated = planner
            .update(
                response.hypothesis_id,
                &SignalUpdate::default()
                    .with_score_avg(0.95)
                    .with_difficulty_adj(2),
            )
            .unwrap();
        assert_eq!(updated.difficulty, Difficulty::Hard);
    }

    #[test]
    fn test_phase_machine() {
        let mut record = ProgressRecord::new(UserId::new("u1"), MissionId::new("m1"), 1);
        assert_eq!(
            phase_of(&record, MissionStatus::InProgress),
            MissionPhase::Planned
        );

        record
            .append(AttemptRecord {
                quest_id: QuestId::new("m1_q1"),
                kind: QuestKind::Standard,
                selected_option: None,
                correct: false,
                time_ms: 5_000,
                score: 0.0,
                point_delta: 100,
                streak_bonus: 0,
                help_used: false,
                challenge: ChallengeOutcome::None,
                telemetry: Telemetry::default(),
                attempted_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(
            phase_of(&record, MissionStatus::InProgress),
            MissionPhase::Active
        );

        assert_eq!(
            phase_of(&record, MissionStatus::Passed),
            MissionPhase::CompletedSuccess
        );

        record.lives = 0;
        assert_eq!(
            phase_of(&record, MissionStatus::InProgress),
            MissionPhase::CompletedFail
        );
    }
}
