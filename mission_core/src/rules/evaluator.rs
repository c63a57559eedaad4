//! Direct rule evaluation over session facts.
//!
//! Evaluation order, not rule-set order, enforces the status precedence:
//! risk reset > deadline reset > passed > in-progress. The evaluator is
//! read-only and idempotent; facts are never consumed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::error::EngineError;
use crate::facts::{Fact, FactValue, Predicate};

use super::{Derivation, Rule, RuleSet};

/// Gating status of a mission session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    #[default]
    InProgress,
    ResetRisk,
    ResetDeadline,
    Passed,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::InProgress => "in_progress",
            MissionStatus::ResetRisk => "reset_risk",
            MissionStatus::ResetDeadline => "reset_deadline",
            MissionStatus::Passed => "passed",
        }
    }

    /// Either reset status.
    pub fn is_reset(&self) -> bool {
        matches!(self, MissionStatus::ResetRisk | MissionStatus::ResetDeadline)
    }
}

impl std::fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(MissionStatus::InProgress),
            "reset_risk" => Ok(MissionStatus::ResetRisk),
            "reset_deadline" => Ok(MissionStatus::ResetDeadline),
            "passed" => Ok(MissionStatus::Passed),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Query predicates supported by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    Status,
    RiskFailed,
    TeamSuccess,
    FinalPoints,
    NextQuestion,
}

/// One bound result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub predicate: String,
    pub values: Vec<FactValue>,
}

impl Row {
    pub fn new(predicate: impl Into<String>, values: Vec<FactValue>) -> Self {
        Self {
            predicate: predicate.into(),
            values,
        }
    }
}

/// Result of one evaluation: bound rows plus the names of the rules that
/// fired, in evaluation order. An empty row set means the queried
/// predicate does not hold for this fact set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Evaluation {
    pub rows: Vec<Row>,
    pub fired: Vec<String>,
}

impl Evaluation {
    /// Parse a status row, if this evaluation produced one.
    pub fn status(&self) -> Option<MissionStatus> {
        self.rows
            .iter()
            .find(|r| r.predicate == "status")
            .and_then(|r| r.values.first())
            .and_then(FactValue::as_str)
            .and_then(|s| s.parse().ok())
    }

    /// First integer binding of the first row.
    pub fn first_int(&self) -> Option<i64> {
        self.rows.first().and_then(|r| r.values.first()).and_then(FactValue::as_int)
    }

    /// Whether the queried predicate holds (any row was bound).
    pub fn holds(&self) -> bool {
        !self.rows.is_empty()
    }
}

/// Pluggable fact/rule evaluation capability.
///
/// [`DirectEvaluator`] is the in-process implementation; a client
/// delegating to an external Datalog solver implements the same contract.
pub trait RuleEvaluator: Send + Sync {
    fn evaluate(
        &self,
        facts: &[Fact],
        rules: &RuleSet,
        query: Query,
    ) -> Result<Evaluation, EngineError>;
}

/// The in-process evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectEvaluator;

impl DirectEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl RuleEvaluator for DirectEvaluator {
    fn evaluate(
        &self,
        facts: &[Fact],
        rules: &RuleSet,
        query: Query,
    ) -> Result<Evaluation, EngineError> {
        match query {
            Query::Status => eval_status(facts, rules),
            Query::RiskFailed => eval_risk_failed(facts, rules),
            Query::TeamSuccess => eval_team_success(facts, rules),
            Query::FinalPoints => eval_final_points(facts, rules),
            Query::NextQuestion => eval_next_question(facts, rules),
        }
    }
}

// ---- fact parsing ----

struct AttemptFact {
    index: i64,
    kind: String,
    correct: bool,
}

fn malformed(fact: &Fact, arg: &str) -> EngineError {
    EngineError::evaluation(format!(
        "fact `{}` for {} has a missing or mistyped `{}` argument",
        fact.predicate, fact.session, arg
    ))
}

fn parse_attempts(facts: &[Fact]) -> Result<Vec<AttemptFact>, EngineError> {
    facts
        .iter()
        .filter(|f| f.predicate == Predicate::Attempt)
        .map(|f| {
            let index = f
                .args
                .first()
                .and_then(FactValue::as_int)
                .ok_or_else(|| malformed(f, "index"))?;
            let kind = f
                .args
                .get(1)
                .and_then(FactValue::as_str)
                .ok_or_else(|| malformed(f, "kind"))?
                .to_string();
            let correct = f
                .args
                .get(2)
                .and_then(FactValue::as_bool)
                .ok_or_else(|| malformed(f, "correct"))?;
            Ok(AttemptFact {
                index,
                kind,
                correct,
            })
        })
        .collect()
}

fn parse_challenges(facts: &[Fact]) -> Result<Vec<(i64, bool)>, EngineError> {
    facts
        .iter()
        .filter(|f| f.predicate == Predicate::Challenge)
        .map(|f| {
            let index = f
                .args
                .first()
                .and_then(FactValue::as_int)
                .ok_or_else(|| malformed(f, "index"))?;
            let success = f
                .args
                .get(1)
                .and_then(FactValue::as_bool)
                .ok_or_else(|| malformed(f, "success"))?;
            Ok((index, success))
        })
        .collect()
}

fn int_facts(facts: &[Fact], predicate: Predicate) -> Result<Vec<i64>, EngineError> {
    facts
        .iter()
        .filter(|f| f.predicate == predicate)
        .map(|f| {
            f.args
                .first()
                .and_then(FactValue::as_int)
                .ok_or_else(|| malformed(f, "value"))
        })
        .collect()
}

fn timestamp_facts(
    facts: &[Fact],
    predicate: Predicate,
) -> Result<Vec<chrono::DateTime<chrono::Utc>>, EngineError> {
    facts
        .iter()
        .filter(|f| f.predicate == predicate)
        .map(|f| {
            f.args
                .first()
                .and_then(FactValue::as_timestamp)
                .ok_or_else(|| malformed(f, "at"))
        })
        .collect()
}

/// Designated risk indexes: declared `risk_index` facts plus any index an
/// attempt was recorded against with kind "risk".
fn risk_indexes(facts: &[Fact], attempts: &[AttemptFact]) -> Result<BTreeSet<i64>, EngineError> {
    let mut indexes: BTreeSet<i64> = int_facts(facts, Predicate::RiskIndex)?.into_iter().collect();
    indexes.extend(attempts.iter().filter(|a| a.kind == "risk").map(|a| a.index));
    Ok(indexes)
}

fn require<'a>(
    rules: &'a RuleSet,
    matches: impl Fn(&Derivation) -> bool,
    what: &str,
) -> Result<&'a Rule, EngineError> {
    rules
        .find(matches)
        .ok_or_else(|| EngineError::evaluation(format!("rule set {} lacks a {what} rule", rules.version)))
}

// ---- derivations ----

fn risk_failed(facts: &[Fact], attempts: &[AttemptFact]) -> Result<bool, EngineError> {
    let indexes = risk_indexes(facts, attempts)?;
    Ok(attempts
        .iter()
        .any(|a| indexes.contains(&a.index) && !a.correct))
}

fn deadline_missed(facts: &[Fact]) -> Result<bool, EngineError> {
    let nows = timestamp_facts(facts, Predicate::Now)?;
    let deadlines = timestamp_facts(facts, Predicate::Deadline)?;
    let (Some(now), Some(deadline)) = (nows.into_iter().max(), deadlines.into_iter().min()) else {
        // Without a clock or a deadline fact the rule cannot fire.
        return Ok(false);
    };
    Ok(now > deadline)
}

fn all_required_complete(
    facts: &[Fact],
    attempts: &[AttemptFact],
) -> Result<bool, EngineError> {
    let Some(required) = int_facts(facts, Predicate::RequiredCount)?.into_iter().max() else {
        return Ok(false);
    };
    if required < 1 {
        return Ok(false);
    }
    let challenges = parse_challenges(facts)?;
    Ok((1..=required).all(|idx| {
        attempts.iter().any(|a| a.index == idx && a.correct)
            || challenges.iter().any(|(i, success)| *i == idx && *success)
    }))
}

/// Team tally: one vote per member, the latest answer wins. Team size
/// comes from the `team_size` fact, falling back to the member count.
fn team_tally(facts: &[Fact]) -> Result<(i64, i64), EngineError> {
    let mut votes: HashMap<String, bool> = HashMap::new();
    for fact in facts.iter().filter(|f| f.predicate == Predicate::TeamAnswer) {
        let member = fact
            .args
            .first()
            .and_then(FactValue::as_str)
            .ok_or_else(|| malformed(fact, "member"))?;
        let correct = fact
            .args
            .get(1)
            .and_then(FactValue::as_bool)
            .ok_or_else(|| malformed(fact, "correct"))?;
        votes.insert(member.to_string(), correct);
    }
    let correct = votes.values().filter(|v| **v).count() as i64;
    let size = int_facts(facts, Predicate::TeamSize)?
        .into_iter()
        .max()
        .unwrap_or(votes.len() as i64);
    Ok((correct, size))
}

fn team_success(facts: &[Fact]) -> Result<(bool, i64, i64), EngineError> {
    let (correct, size) = team_tally(facts)?;
    Ok((size > 0 && correct * 2 > size, correct, size))
}

// ---- queries ----

fn eval_status(facts: &[Fact], rules: &RuleSet) -> Result<Evaluation, EngineError> {
    let risk_rule = require(rules, |d| *d == Derivation::RiskFailed, "risk_failed")?;
    let reset_risk = require(rules, |d| *d == Derivation::ResetOnRiskFailure, "risk reset")?;
    let reset_deadline = require(rules, |d| *d == Derivation::ResetOnDeadline, "deadline reset")?;
    let passed = require(rules, |d| *d == Derivation::PassWhenComplete, "pass")?;
    let in_progress = require(rules, |d| *d == Derivation::HoldInProgress, "in-progress")?;

    let attempts = parse_attempts(facts)?;
    let mut fired = Vec::new();

    // Precedence is this evaluation order, nothing else.
    let status = if risk_failed(facts, &attempts)? {
        fired.push(risk_rule.name.clone());
        fired.push(reset_risk.name.clone());
        MissionStatus::ResetRisk
    } else if deadline_missed(facts)? {
        fired.push(reset_deadline.name.clone());
        MissionStatus::ResetDeadline
    } else if all_required_complete(facts, &attempts)? {
        fired.push(passed.name.clone());
        MissionStatus::Passed
    } else {
        fired.push(in_progress.name.clone());
        MissionStatus::InProgress
    };

    Ok(Evaluation {
        rows: vec![Row::new("status", vec![FactValue::Str(status.as_str().into())])],
        fired,
    })
}

fn eval_risk_failed(facts: &[Fact], rules: &RuleSet) -> Result<Evaluation, EngineError> {
    let rule = require(rules, |d| *d == Derivation::RiskFailed, "risk_failed")?;
    let attempts = parse_attempts(facts)?;
    if risk_failed(facts, &attempts)? {
        Ok(Evaluation {
            rows: vec![Row::new("risk_failed", vec![FactValue::Bool(true)])],
            fired: vec![rule.name.clone()],
        })
    } else {
        Ok(Evaluation::default())
    }
}

fn eval_team_success(facts: &[Fact], rules: &RuleSet) -> Result<Evaluation, EngineError> {
    let rule = require(rules, |d| *d == Derivation::TeamSuccess, "team_success")?;
    let (holds, correct, size) = team_success(facts)?;
    if holds {
        Ok(Evaluation {
            rows: vec![Row::new(
                "team_success",
                vec![FactValue::Int(correct), FactValue::Int(size)],
            )],
            fired: vec![rule.name.clone()],
        })
    } else {
        Ok(Evaluation::default())
    }
}

fn eval_final_points(facts: &[Fact], rules: &RuleSet) -> Result<Evaluation, EngineError> {
    let team_rule = require(rules, |d| *d == Derivation::TeamSuccess, "team_success")?;
    let points_rule = require(
        rules,
        |d| matches!(d, Derivation::FinalPoints { .. }),
        "final points",
    )?;
    let Derivation::FinalPoints { team_multiplier } = points_rule.derives else {
        unreachable!("matched FinalPoints above");
    };

    let Some(base) = int_facts(facts, Predicate::BasePoints)?.into_iter().last() else {
        return Ok(Evaluation::default());
    };

    let (team, _, _) = team_success(facts)?;
    let mut fired = Vec::new();
    let final_points = if team {
        fired.push(team_rule.name.clone());
        (base as f64 * team_multiplier).round() as i64
    } else {
        base
    };
    fired.push(points_rule.name.clone());

    Ok(Evaluation {
        rows: vec![Row::new("points_final", vec![FactValue::Int(final_points)])],
        fired,
    })
}

fn eval_next_question(facts: &[Fact], rules: &RuleSet) -> Result<Evaluation, EngineError> {
    let next_rule = require(rules, |d| *d == Derivation::NextQuestion, "next question")?;

    let status_eval = eval_status(facts, rules)?;
    let status = status_eval.status().unwrap_or_default();
    if status.is_reset() {
        let mut fired = status_eval.fired;
        fired.push(next_rule.name.clone());
        return Ok(Evaluation {
            rows: vec![Row::new("next_question", vec![FactValue::Int(1)])],
            fired,
        });
    }

    let Some(current) = int_facts(facts, Predicate::CurrentIndex)?.into_iter().max() else {
        return Ok(Evaluation::default());
    };

    let attempts = parse_attempts(facts)?;
    let challenges = parse_challenges(facts)?;
    let advanced = attempts.iter().any(|a| a.index == current && a.correct)
        || challenges.iter().any(|(i, success)| *i == current && *success);

    let next = if advanced { current + 1 } else { current };
    Ok(Evaluation {
        rows: vec![Row::new("next_question", vec![FactValue::Int(next)])],
        fired: vec![next_rule.name.clone()],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use quest_rules::{MissionId, QuestKind, SessionKey, UserId};

    fn session() -> SessionKey {
        SessionKey::new(UserId::new("u1"), MissionId::new("m1"))
    }

    fn status_of(facts: &[Fact]) -> MissionStatus {
        DirectEvaluator::new()
            .evaluate(facts, &RuleSet::standard(), Query::Status)
            .unwrap()
            .status()
            .unwrap()
    }

    fn attempt(index: u32, kind: QuestKind, correct: bool) -> Fact {
        Fact::attempt(session(), index, kind, correct, Utc::now())
    }

    #[test]
    fn test_risk_failure_forces_reset() {
        let facts = vec![
            Fact::risk_index(session(), 5),
            attempt(5, QuestKind::Risk, false),
        ];
        assert_eq!(status_of(&facts), MissionStatus::ResetRisk);
    }

    #[test]
    fn test_risk_reset_overrides_team_success() {
        // Team majority present, yet the risk failure must win.
        let facts = vec![
            Fact::risk_index(session(), 5),
            attempt(5, QuestKind::Risk, true),
            attempt(5, QuestKind::Risk, false),
            Fact::team_answer(session(), "a", true),
            Fact::team_answer(session(), "b", true),
            Fact::team_answer(session(), "c", true),
            Fact::team_size(session(), 5),
        ];
        assert_eq!(status_of(&facts), MissionStatus::ResetRisk);
    }

    #[test]
    fn test_risk_sub_parts_both_correct_stay_in_progress() {
        let facts = vec![
            Fact::required_count(session(), 10),
            Fact::risk_index(session(), 5),
            attempt(5, QuestKind::Risk, true),
            attempt(5, QuestKind::Risk, true),
        ];
        assert_eq!(status_of(&facts), MissionStatus::InProgress);
    }

    #[test]
    fn test_risk_kind_attempt_designates_index_without_declaration() {
        // No risk_index fact; the attempt's own kind marks the index.
        let facts = vec![attempt(7, QuestKind::Risk, false)];
        assert_eq!(status_of(&facts), MissionStatus::ResetRisk);
    }

    #[test]
    fn test_deadline_reset_needs_now_and_deadline() {
        let now = Utc::now();
        let missed = vec![
            Fact::deadline(session(), now - Duration::hours(1)),
            Fact::now(session(), now),
        ];
        assert_eq!(status_of(&missed), MissionStatus::ResetDeadline);

        let no_clock = vec![Fact::deadline(session(), now - Duration::hours(1))];
        assert_eq!(status_of(&no_clock), MissionStatus::InProgress);

        let in_time = vec![
            Fact::deadline(session(), now + Duration::hours(1)),
            Fact::now(session(), now),
        ];
        assert_eq!(status_of(&in_time), MissionStatus::InProgress);
    }

    #[test]
    fn test_risk_reset_beats_deadline_reset() {
        let now = Utc::now();
        let facts = vec![
            Fact::deadline(session(), now - Duration::hours(1)),
            Fact::now(session(), now),
            attempt(5, QuestKind::Risk, false),
        ];
        assert_eq!(status_of(&facts), MissionStatus::ResetRisk);
    }

    #[test]
    fn test_passed_when_every_required_index_answered() {
        let mut facts = vec![Fact::required_count(session(), 3)];
        facts.push(attempt(1, QuestKind::Standard, true));
        facts.push(attempt(2, QuestKind::Standard, true));
        // Index 3 solved through its challenge instead of the answer.
        facts.push(attempt(3, QuestKind::Standard, false));
        facts.push(Fact::challenge(session(), 3, true));
        assert_eq!(status_of(&facts), MissionStatus::Passed);
    }

    #[test]
    fn test_incomplete_required_set_is_in_progress() {
        let facts = vec![
            Fact::required_count(session(), 3),
            attempt(1, QuestKind::Standard, true),
        ];
        assert_eq!(status_of(&facts), MissionStatus::InProgress);
    }

    #[test]
    fn test_team_success_is_strict_majority() {
        let eval = |correct: usize, size: u32| {
            let mut facts = vec![Fact::team_size(session(), size)];
            for i in 0..size as usize {
                facts.push(Fact::team_answer(session(), format!("m{i}"), i < correct));
            }
            DirectEvaluator::new()
                .evaluate(&facts, &RuleSet::standard(), Query::TeamSuccess)
                .unwrap()
                .holds()
        };
        assert!(eval(3, 5));
        assert!(!eval(2, 5));
        // Exactly half is not a majority.
        assert!(!eval(2, 4));
    }

    #[test]
    fn test_team_latest_vote_per_member_wins() {
        let facts = vec![
            Fact::team_size(session(), 3),
            Fact::team_answer(session(), "a", false),
            Fact::team_answer(session(), "a", true),
            Fact::team_answer(session(), "b", true),
        ];
        let eval = DirectEvaluator::new()
            .evaluate(&facts, &RuleSet::standard(), Query::TeamSuccess)
            .unwrap();
        assert!(eval.holds());
    }

    #[test]
    fn test_final_points_triple_on_team_success() {
        let mut facts = vec![
            Fact::base_points(session(), 100),
            Fact::team_size(session(), 5),
        ];
        for i in 0..3 {
            facts.push(Fact::team_answer(session(), format!("m{i}"), true));
        }
        let eval = DirectEvaluator::new()
            .evaluate(&facts, &RuleSet::standard(), Query::FinalPoints)
            .unwrap();
        assert_eq!(eval.first_int(), Some(300));
        assert!(eval.fired.contains(&"team_success".to_string()));

        let plain = vec![Fact::base_points(session(), 100)];
        let eval = DirectEvaluator::new()
            .evaluate(&plain, &RuleSet::standard(), Query::FinalPoints)
            .unwrap();
        assert_eq!(eval.first_int(), Some(100));
        assert!(!eval.fired.contains(&"team_success".to_string()));
    }

    #[test]
    fn test_next_question_advances_only_on_success() {
        let base = vec![Fact::current_index(session(), 4)];
        let eval = DirectEvaluator::new()
            .evaluate(&base, &RuleSet::standard(), Query::NextQuestion)
            .unwrap();
        assert_eq!(eval.first_int(), Some(4));

        let mut advanced = base.clone();
        advanced.push(attempt(4, QuestKind::Standard, true));
        let eval = DirectEvaluator::new()
            .evaluate(&advanced, &RuleSet::standard(), Query::NextQuestion)
            .unwrap();
        assert_eq!(eval.first_int(), Some(5));
    }

    #[test]
    fn test_next_question_resets_to_one_on_risk_failure() {
        let facts = vec![
            Fact::current_index(session(), 6),
            attempt(5, QuestKind::Risk, false),
        ];
        let eval = DirectEvaluator::new()
            .evaluate(&facts, &RuleSet::standard(), Query::NextQuestion)
            .unwrap();
        assert_eq!(eval.first_int(), Some(1));
        assert!(eval.fired.contains(&"status_reset_risk".to_string()));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let now = Utc::now();
        let facts = vec![
            Fact::required_count(session(), 2),
            Fact::base_points(session(), 250),
            Fact::now(session(), now),
            Fact::deadline(session(), now + Duration::days(1)),
            attempt(1, QuestKind::Standard, true),
        ];
        let evaluator = DirectEvaluator::new();
        let rules = RuleSet::standard();
        for query in [Query::Status, Query::FinalPoints, Query::NextQuestion] {
            let first = evaluator.evaluate(&facts, &rules, query).unwrap();
            let second = evaluator.evaluate(&facts, &rules, query).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_mistyped_fact_fails_closed() {
        let mut bad = Fact::risk_index(session(), 5);
        bad.args = vec![FactValue::Str("five".into())];
        let facts = vec![bad, attempt(5, QuestKind::Standard, false)];
        let err = DirectEvaluator::new()
            .evaluate(&facts, &RuleSet::standard(), Query::Status)
            .unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(_)));
    }

    #[test]
    fn test_missing_status_rule_is_an_error() {
        let rules = RuleSet {
            version: "broken".into(),
            rules: vec![Rule::new("risk_failed", Derivation::RiskFailed)],
        };
        let err = DirectEvaluator::new()
            .evaluate(&[], &rules, Query::Status)
            .unwrap_err();
        assert!(matches!(err, EngineError::Evaluation(_)));
    }

    #[test]
    fn test_fired_rules_report_evaluation_order() {
        let facts = vec![attempt(5, QuestKind::Risk, false)];
        let eval = DirectEvaluator::new()
            .evaluate(&facts, &RuleSet::standard(), Query::Status)
            .unwrap();
        assert_eq!(eval.fired, vec!["risk_failed", "status_reset_risk"]);
    }
}
