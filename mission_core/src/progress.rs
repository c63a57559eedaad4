//! Progress state - per (user, mission) bookkeeping of lives, points,
//! question index, and the ordered attempt history.
//!
//! The progress record is the authority for *what happened*; whether the
//! user may proceed is decided by the rule evaluator (see `rules`).

use chrono::{DateTime, Utc};
use quest_rules::{ChallengeOutcome, MissionId, QuestId, QuestKind, SessionKey, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::error::EngineError;
use crate::rubric::{min_think_time_ms, Telemetry};

/// One scored answer, appended to the history and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub quest_id: QuestId,
    pub kind: QuestKind,
    pub selected_option: Option<String>,
    pub correct: bool,
    pub time_ms: u64,
    /// Normalized rubric score in [0, 1].
    pub score: f64,
    /// Raw per-quest point delta from the points engine.
    pub point_delta: i64,
    /// Additive streak bonus banked with this attempt.
    pub streak_bonus: i64,
    pub help_used: bool,
    pub challenge: ChallengeOutcome,
    pub telemetry: Telemetry,
    pub attempted_at: DateTime<Utc>,
}

/// Summary statistics over a record's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct ProgressStats {
    pub score_avg: f64,
    pub help_rate: f64,
    pub total_attempts: usize,
    pub correct_attempts: usize,
}

/// Mutable per-(user, mission) progress record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user: UserId,
    pub mission: MissionId,
    pub lives: u32,
    pub points: i64,
    /// 1-based index of the question the user currently faces.
    pub question_index: u32,
    pub finished: bool,
    pub success: bool,
    pub history: Vec<AttemptRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    pub fn new(user: UserId, mission: MissionId, lives_start: u32) -> Self {
        Self {
            user,
            mission,
            lives: lives_start,
            points: 0,
            question_index: 1,
            finished: false,
            success: false,
            history: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn session_key(&self) -> SessionKey {
        SessionKey::new(self.user.clone(), self.mission.clone())
    }

    /// Append one attempt, applying the bookkeeping invariants:
    /// the question index advances only on a correct answer or a
    /// successful challenge; lives drop only on challenge failure and
    /// never below zero; a finished record rejects writes.
    pub fn append(&mut self, attempt: AttemptRecord) -> Result<(), EngineError> {
        if self.finished {
            return Err(EngineError::validation(format!(
                "mission {} already finished for {}",
                self.mission, self.user
            )));
        }

        self.points += attempt.point_delta + attempt.streak_bonus;

        if attempt.challenge == ChallengeOutcome::Fail {
            self.lives = self.lives.saturating_sub(1);
        }
        if attempt.correct || attempt.challenge == ChallengeOutcome::Success {
            self.question_index += 1;
        }

        self.history.push(attempt);
        Ok(())
    }

    /// Length of the trailing run of correct attempts.
    pub fn streak(&self) -> u32 {
        self.history
            .iter()
            .rev()
            .take_while(|a| a.correct)
            .count() as u32
    }

    /// Length of the trailing run of implausibly fast attempts, judged
    /// against each attempt's per-kind minimum think time.
    pub fn rapid_run_len(&self) -> u32 {
        self.history
            .iter()
            .rev()
            .take_while(|a| a.time_ms < min_think_time_ms(a.kind))
            .count() as u32
    }

    pub fn stats(&self) -> ProgressStats {
        if self.history.is_empty() {
            return ProgressStats::default();
        }
        let total = self.history.len();
        let correct = self.history.iter().filter(|a| a.correct).count();
        let helped = self.history.iter().filter(|a| a.help_used).count();
        let score_sum: f64 = self.history.iter().map(|a| a.score).sum();
        ProgressStats {
            score_avg: score_sum / total as f64,
            help_rate: helped as f64 / total as f64,
            total_attempts: total,
            correct_attempts: correct,
        }
    }
}

/// Keyed progress storage.
///
/// Appends on one key are serialized through that record's own mutex and
/// applied in submission order; operations on different keys share no lock.
/// The outer map lock is held only to look up or insert the entry, never
/// across a record mutation.
#[derive(Debug, Default)]
pub struct ProgressStore {
    records: RwLock<HashMap<SessionKey, Arc<Mutex<ProgressRecord>>>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &SessionKey) -> Option<Arc<Mutex<ProgressRecord>>> {
        self.records
            .read()
            .expect("progress store poisoned")
            .get(key)
            .cloned()
    }

    /// Start progress for a session, or return the existing in-flight
    /// record. A finished record is replaced by a fresh run.
    pub fn start(&self, user: UserId, mission: MissionId, lives_start: u32) -> ProgressRecord {
        let key = SessionKey::new(user.clone(), mission.clone());
        let mut records = self.records.write().expect("progress store poisoned");
        if let Some(existing) = records.get(&key) {
            let record = existing.lock().expect("progress record poisoned");
            if !record.finished {
                return record.clone();
            }
        }
        let record = ProgressRecord::new(user, mission, lives_start);
        records.insert(key, Arc::new(Mutex::new(record.clone())));
        record
    }

    /// Append an attempt to a session's record, returning the updated
    /// snapshot. Fails with a not-found error for unknown sessions.
    pub fn append_attempt(
        &self,
        key: &SessionKey,
        attempt: AttemptRecord,
    ) -> Result<ProgressRecord, EngineError> {
        let entry = self
            .entry(key)
            .ok_or_else(|| EngineError::not_found("progress", key))?;
        let mut record = entry.lock().expect("progress record poisoned");
        record.append(attempt)?;
        Ok(record.clone())
    }

    /// Mark a session finished. Idempotent: a second call returns the
    /// already-finished snapshot unchanged.
    pub fn finish(&self, key: &SessionKey, success: bool) -> Result<ProgressRecord, EngineError> {
        let entry = self
            .entry(key)
            .ok_or_else(|| EngineError::not_found("progress", key))?;
        let mut record = entry.lock().expect("progress record poisoned");
        if !record.finished {
            record.finished = true;
            record.success = success;
            record.finished_at = Some(Utc::now());
        }
        Ok(record.clone())
    }

    /// Award bonus-minigame rewards: flat points plus extra lives, capped.
    pub fn award_bonus(
        &self,
        key: &SessionKey,
        points: i64,
        life_plus: u32,
        life_cap: u32,
    ) -> Result<ProgressRecord, EngineError> {
        let entry = self
            .entry(key)
            .ok_or_else(|| EngineError::not_found("progress", key))?;
        let mut record = entry.lock().expect("progress record poisoned");
        record.points += points;
        record.lives = (record.lives + life_plus).min(life_cap);
        Ok(record.clone())
    }

    /// Snapshot of one session's record.
    pub fn get(&self, key: &SessionKey) -> Option<ProgressRecord> {
        self.entry(key)
            .map(|e| e.lock().expect("progress record poisoned").clone())
    }

    /// All of a user's mission records, most recently started first.
    pub fn user_history(&self, user: &UserId) -> Vec<ProgressRecord> {
        let mut result: Vec<ProgressRecord> = self
            .records
            .read()
            .expect("progress store poisoned")
            .values()
            .map(|e| e.lock().expect("progress record poisoned").clone())
            .filter(|r| &r.user == user)
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(correct: bool, challenge: ChallengeOutcome) -> AttemptRecord {
        AttemptRecord {
            quest_id: QuestId::new("m1_q1"),
            kind: QuestKind::Standard,
            selected_option: Some("a".into()),
            correct,
            time_ms: 8_000,
            score: if correct { 1.0 } else { 0.0 },
            point_delta: 100,
            streak_bonus: 0,
            help_used: false,
            challenge,
            telemetry: Telemetry::default(),
            attempted_at: Utc::now(),
        }
    }

    fn key() -> SessionKey {
        SessionKey::new(UserId::new("u1"), MissionId::new("m1"))
    }

    #[test]
    fn test_index_advances_only_on_success() {
        let mut record = ProgressRecord::new(UserId::new("u1"), MissionId::new("m1"), 3);
        assert_eq!(record.question_index, 1);

        record.append(attempt(false, ChallengeOutcome::None)).unwrap();
        assert_eq!(record.question_index, 1);

        record.append(attempt(true, ChallengeOutcome::None)).unwrap();
        assert_eq!(record.question_index, 2);

        record.append(attempt(false, ChallengeOutcome::Success)).unwrap();
        assert_eq!(record.question_index, 3);
    }

    #[test]
    fn test_index_is_monotone_across_any_append_sequence() {
        let mut record = ProgressRecord::new(UserId::new("u1"), MissionId::new("m1"), 3);
        let outcomes = [
            (true, ChallengeOutcome::None),
            (false, ChallengeOutcome::Fail),
            (false, ChallengeOutcome::None),
            (true, ChallengeOutcome::Success),
            (false, ChallengeOutcome::Success),
        ];
        let mut last = record.question_index;
        for (correct, challenge) in outcomes {
            record.append(attempt(correct, challenge)).unwrap();
            assert!(record.question_index >= last);
            last = record.question_index;
        }
    }

    #[test]
    fn test_lives_drop_only_on_challenge_fail_and_floor_at_zero() {
        let mut record = ProgressRecord::new(UserId::new("u1"), MissionId::new("m1"), 1);
        record.append(attempt(false, ChallengeOutcome::None)).unwrap();
        assert_eq!(record.lives, 1);

        record.append(attempt(false, ChallengeOutcome::Fail)).unwrap();
        assert_eq!(record.lives, 0);

        record.append(attempt(false, ChallengeOutcome::Fail)).unwrap();
        assert_eq!(record.lives, 0);
    }

    #[test]
    fn test_finished_record_rejects_appends() {
        let store = ProgressStore::new();
        store.start(UserId::new("u1"), MissionId::new("m1"), 3);
        store.finish(&key(), true).unwrap();

        let err = store
            .append_attempt(&key(), attempt(true, ChallengeOutcome::None))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_streak_counts_trailing_correct_run() {
        let mut record = ProgressRecord::new(UserId::new("u1"), MissionId::new("m1"), 3);
        for correct in [true, false, true, true, true] {
            record.append(attempt(correct, ChallengeOutcome::None)).unwrap();
        }
        assert_eq!(record.streak(), 3);
    }

    #[test]
    fn test_points_accumulate_with_streak_bonus() {
        let mut record = ProgressRecord::new(UserId::new("u1"), MissionId::new("m1"), 3);
        let mut banked = attempt(true, ChallengeOutcome::None);
        banked.streak_bonus = 50;
        record.append(banked).unwrap();
        assert_eq!(record.points, 150);
    }

    #[test]
    fn test_start_keeps_in_flight_record_but_replaces_finished_one() {
        let store = ProgressStore::new();
        store.start(UserId::new("u1"), MissionId::new("m1"), 3);
        store
            .append_attempt(&key(), attempt(true, ChallengeOutcome::None))
            .unwrap();

        // Replay while in flight: same record.
        let replay = store.start(UserId::new("u1"), MissionId::new("m1"), 3);
        assert_eq!(replay.history.len(), 1);

        store.finish(&key(), false).unwrap();
        let fresh = store.start(UserId::new("u1"), MissionId::new("m1"), 3);
        assert!(fresh.history.is_empty());
        assert!(!fresh.finished);
    }

    #[test]
    fn test_bonus_award_caps_lives() {
        let store = ProgressStore::new();
        store.start(UserId::new("u1"), MissionId::new("m1"), 3);
        let record = store.award_bonus(&key(), 5000, 1, 4).unwrap();
        assert_eq!(record.points, 5000);
        assert_eq!(record.lives, 4);

        let record = store.award_bonus(&key(), 0, 3, 4).unwrap();
        assert_eq!(record.lives, 4);
    }

    #[test]
    fn test_user_history_most_recent_first() {
        let store = ProgressStore::new();
        store.start(UserId::new("u1"), MissionId::new("m1"), 3);
        store.start(UserId::new("u1"), MissionId::new("m2"), 3);
        store.start(UserId::new("u2"), MissionId::new("m1"), 3);

        let history = store.user_history(&UserId::new("u1"));
        assert_eq!(history.len(), 2);
        assert!(history[0].started_at >= history[1].started_at);
    }

    #[test]
    fn test_concurrent_appends_on_distinct_keys() {
        use std::sync::Arc;

        let store = Arc::new(ProgressStore::new());
        for i in 0..4 {
            store.start(UserId::new(format!("u{i}")), MissionId::new("m1"), 3);
        }

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let key = SessionKey::new(UserId::new(format!("u{i}")), MissionId::new("m1"));
                    for _ in 0..25 {
                        store
                            .append_attempt(&key, attempt(true, ChallengeOutcome::None))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..4 {
            let key = SessionKey::new(UserId::new(format!("u{i}")), MissionId::new("m1"));
            let record = store.get(&key).unwrap();
            assert_eq!(record.history.len(), 25);
            assert_eq!(record.question_index, 26);
        }
    }
}
