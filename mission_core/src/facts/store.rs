//! Append-only fact store, partitioned by session.

use quest_rules::SessionKey;
use std::collections::HashMap;
use std::sync::RwLock;

use super::{Fact, FactId, Predicate};

/// Per-session collection of facts.
///
/// Facts follow set semantics: asserting an observation that is already
/// present (same predicate, session, and arguments) is a no-op, so replayed
/// plan calls and duplicate client submissions do not skew evaluation.
/// There is no removal; a session's fact set only grows.
#[derive(Debug, Default)]
pub struct FactStore {
    by_session: RwLock<HashMap<SessionKey, Vec<Fact>>>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assert a fact. Returns the ID of the stored fact, which is the
    /// existing one when the observation was already present.
    pub fn assert_fact(&self, fact: Fact) -> FactId {
        let mut sessions = self.by_session.write().expect("fact store poisoned");
        let facts = sessions.entry(fact.session.clone()).or_default();
        if let Some(existing) = facts.iter().find(|f| f.same_observation(&fact)) {
            return existing.id;
        }
        let id = fact.id;
        facts.push(fact);
        id
    }

    /// Assert a batch of facts in order.
    pub fn assert_all(&self, facts: impl IntoIterator<Item = Fact>) {
        for fact in facts {
            self.assert_fact(fact);
        }
    }

    /// Snapshot of a session's facts, in assertion order.
    ///
    /// The evaluator works on this owned snapshot, so evaluation can run
    /// concurrently with writers (results may be stale by one in-flight
    /// append, which gating tolerates by re-checking before every
    /// transition).
    pub fn session_view(&self, session: &SessionKey) -> Vec<Fact> {
        self.by_session
            .read()
            .expect("fact store poisoned")
            .get(session)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of facts recorded for a session.
    pub fn fact_count(&self, session: &SessionKey) -> usize {
        self.by_session
            .read()
            .expect("fact store poisoned")
            .get(session)
            .map(|f| f.len())
            .unwrap_or(0)
    }

    /// Facts for one predicate within a session, in assertion order.
    pub fn facts_with(&self, session: &SessionKey, predicate: &Predicate) -> Vec<Fact> {
        self.session_view(session)
            .into_iter()
            .filter(|f| &f.predicate == predicate)
            .collect()
    }
}
