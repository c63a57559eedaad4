//! Hypothesis state - the planner's current belief about the right
//! difficulty and the learner's behavioral state for one mission attempt.

use chrono::{DateTime, Utc};
use quest_rules::{Difficulty, MissionId, UserId, World};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use crate::error::EngineError;

/// Unique identifier for hypotheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HypothesisId(pub Uuid);

impl HypothesisId {
    /// Create a new random hypothesis ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HypothesisId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HypothesisId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rolling behavioral signals tracked on a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct HypothesisSignals {
    pub score_avg: f64,
    pub help_rate: f64,
    /// Last applied difficulty delta, in {-1, 0, 1}.
    pub difficulty_adj: i8,
    pub fatigue: bool,
    pub guess_pattern: bool,
}

/// Partial signal merge passed to [`Hypothesis::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct SignalUpdate {
    pub score_avg: Option<f64>,
    pub help_rate: Option<f64>,
    pub difficulty_adj: Option<i8>,
    pub fatigue: Option<bool>,
    pub guess_pattern: Option<bool>,
}

impl SignalUpdate {
    pub fn with_score_avg(mut self, avg: f64) -> Self {
        self.score_avg = Some(avg);
        self
    }

    pub fn with_help_rate(mut self, rate: f64) -> Self {
        self.help_rate = Some(rate);
        self
    }

    pub fn with_difficulty_adj(mut self, adj: i8) -> Self {
        self.difficulty_adj = Some(adj);
        self
    }

    pub fn with_fatigue(mut self, fatigue: bool) -> Self {
        self.fatigue = Some(fatigue);
        self
    }

    pub fn with_guess_pattern(mut self, guess: bool) -> Self {
        self.guess_pattern = Some(guess);
        self
    }
}

impl From<HypothesisSignals> for SignalUpdate {
    fn from(signals: HypothesisSignals) -> Self {
        Self {
            score_avg: Some(signals.score_avg),
            help_rate: Some(signals.help_rate),
            difficulty_adj: Some(signals.difficulty_adj),
            fatigue: Some(signals.fatigue),
            guess_pattern: Some(signals.guess_pattern),
        }
    }
}

/// The planner's adaptive-difficulty record for one mission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: HypothesisId,
    pub user: UserId,
    pub mission: MissionId,
    pub world: World,
    pub difficulty: Difficulty,
    pub signals: HypothesisSignals,
    /// Human-readable adjustment notes, oldest first.
    pub notes: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Hypothesis {
    pub fn new(user: UserId, mission: MissionId, world: World, difficulty: Difficulty) -> Self {
        let now = Utc::now();
        Self {
            id: HypothesisId::new(),
            user,
            mission,
            world,
            difficulty,
            signals: HypothesisSignals::default(),
            notes: vec![format!("initial hypothesis: difficulty={difficulty}")],
            started_at: now,
            updated_at: now,
        }
    }

    /// Merge incoming signals and adjust difficulty.
    ///
    /// Difficulty moves at most one step per call, clamped to the scale
    /// bounds; every change appends exactly one note recording the old
    /// value, the new value, and the rolling average that triggered it.
    pub fn apply(&mut self, update: &SignalUpdate) {
        let had_fatigue = self.signals.fatigue;
        let had_guess = self.signals.guess_pattern;

        if let Some(avg) = update.score_avg {
            self.signals.score_avg = avg;
        }
        if let Some(rate) = update.help_rate {
            self.signals.help_rate = rate;
        }
        if let Some(fatigue) = update.fatigue {
            self.signals.fatigue = fatigue;
        }
        if let Some(guess) = update.guess_pattern {
            self.signals.guess_pattern = guess;
        }

        if let Some(adj) = update.difficulty_adj {
            let step = adj.clamp(-1, 1);
            self.signals.difficulty_adj = step;
            let next = self.difficulty.step(step);
            if next != self.difficulty {
                self.notes.push(format!(
                    "difficulty adjusted: {} -> {} (rolling avg {:.2})",
                    self.difficulty, next, self.signals.score_avg
                ));
                self.difficulty = next;
            }
        }

        if self.signals.guess_pattern && !had_guess {
            self.notes
                .push("guessing pattern detected: answers arriving implausibly fast".to_string());
        }
        if self.signals.fatigue && !had_fatigue {
            self.notes
                .push("fatigue detected: correctness declining over recent attempts".to_string());
        }

        self.updated_at = Utc::now();
    }
}

/// Keyed hypothesis storage with per-record locking.
#[derive(Debug, Default)]
pub struct HypothesisStore {
    records: RwLock<HashMap<HypothesisId, Arc<Mutex<Hypothesis>>>>,
}

impl HypothesisStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a fresh hypothesis, returning a snapshot.
    pub fn create(
        &self,
        user: UserId,
        mission: MissionId,
        world: World,
        difficulty: Difficulty,
    ) -> Hypothesis {
        let hypothesis = Hypothesis::new(user, mission, world, difficulty);
        self.records
            .write()
            .expect("hypothesis store poisoned")
            .insert(hypothesis.id, Arc::new(Mutex::new(hypothesis.clone())));
        hypothesis
    }

    fn entry(&self, id: HypothesisId) -> Option<Arc<Mutex<Hypothesis>>> {
        self.records
            .read()
            .expect("hypothesis store poisoned")
            .get(&id)
            .cloned()
    }

    /// Apply a signal update. Fails with a not-found error for unknown IDs.
    pub fn update(
        &self,
        id: HypothesisId,
        update: &SignalUpdate,
    ) -> Result<Hypothesis, EngineError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| EngineError::not_found("hypothesis", id))?;
        let mut hypothesis = entry.lock().expect("hypothesis record poisoned");
        hypothesis.apply(update);
        Ok(hypothesis.clone())
    }

    /// Append a free-form reasoning note.
    pub fn add_note(&self, id: HypothesisId, note: impl Into<String>) -> Result<(), EngineError> {
        let entry = self
            .entry(id)
            .ok_or_else(|| EngineError::not_found("hypothesis", id))?;
        let mut hypothesis = entry.lock().expect("hypothesis record poisoned");
        hypothesis.notes.push(note.into());
        hypothesis.updated_at = Utc::now();
        Ok(())
    }

    /// Snapshot of one hypothesis.
    pub fn get(&self, id: HypothesisId) -> Option<Hypothesis> {
        self.entry(id)
            .map(|e| e.lock().expect("hypothesis record poisoned").clone())
    }

    /// All hypotheses for a user, most recent first.
    pub fn for_user(&self, user: &UserId) -> Vec<Hypothesis> {
        let mut result: Vec<Hypothesis> = self
            .records
            .read()
            .expect("hypothesis store poisoned")
            .values()
            .map(|e| e.lock().expect("hypothesis record poisoned").clone())
            .filter(|h| &h.user == user)
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(difficulty: Difficulty) -> Hypothesis {
        Hypothesis::new(
            UserId::new("u1"),
            MissionId::new("m1"),
            World::It,
            difficulty,
        )
    }

    #[test]
    fn test_difficulty_moves_one_step_and_notes_it() {
        let mut hypothesis = fresh(Difficulty::Easy);
        hypothesis.apply(
            &SignalUpdate::default()
                .with_score_avg(0.92)
                .with_difficulty_adj(1),
        );
        assert_eq!(hypothesis.difficulty, Difficulty::Medium);

        let note = hypothesis.notes.last().unwrap();
        assert!(note.contains("easy -> medium"));
        assert!(note.contains("0.92"));
    }

    #[test]
    fn test_oversized_delta_is_clamped_to_one_step() {
        let mut hypothesis = fresh(Difficulty::Easy);
        hypothesis.apply(&SignalUpdate::default().with_difficulty_adj(3));
        assert_eq!(hypothesis.difficulty, Difficulty::Medium);
        assert_eq!(hypothesis.signals.difficulty_adj, 1);
    }

    #[test]
    fn test_difficulty_never_leaves_scale() {
        let mut hypothesis = fresh(Difficulty::Hard);
        hypothesis.apply(&SignalUpdate::default().with_difficulty_adj(1));
        assert_eq!(hypothesis.difficulty, Difficulty::Hard);

        let mut hypothesis = fresh(Difficulty::Easy);
        let notes_before = hypothesis.notes.len();
        hypothesis.apply(&SignalUpdate::default().with_difficulty_adj(-1));
        assert_eq!(hypothesis.difficulty, Difficulty::Easy);
        // No change, so no adjustment note.
        assert_eq!(hypothesis.notes.len(), notes_before);
    }

    #[test]
    fn test_pattern_notes_fire_on_rising_edge_only() {
        let mut hypothesis = fresh(Difficulty::Medium);
        hypothesis.apply(&SignalUpdate::default().with_fatigue(true));
        let after_first = hypothesis.notes.len();
        hypothesis.apply(&SignalUpdate::default().with_fatigue(true));
        assert_eq!(hypothesis.notes.len(), after_first);
    }

    #[test]
    fn test_store_update_unknown_id() {
        let store = HypothesisStore::new();
        let err = store
            .update(HypothesisId::new(), &SignalUpdate::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[test]
    fn test_store_round_trip_and_user_listing() {
        let store = HypothesisStore::new();
        let created = store.create(
            UserId::new("u1"),
            MissionId::new("m1"),
            World::Legal,
            Difficulty::Medium,
        );

        let updated = store
            .update(created.id, &SignalUpdate::default().with_score_avg(0.7))
            .unwrap();
        assert_eq!(updated.signals.score_avg, 0.7);

        let listed = store.for_user(&UserId::new("u1"));
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert!(store.for_user(&UserId::new("other")).is_empty());
    }
}
