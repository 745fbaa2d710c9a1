//! Per-room shared-state cache.
//!
//! Holds the last-known attribute map for every participant plus the turn
//! descriptor, and exists to catch up joiners and reconnectors. Merge
//! semantics are deliberately simple: last-write-wins per top-level key,
//! applied in delivery order. When two updates race on the same key the
//! outcome is whichever arrived last -- an accepted trade-off, not a defect.

use crate::protocol::{AttributeMap, ParticipantId, SharedState, TurnDescriptor};

/// Shallow-merge `delta` into `target`, replacing top-level keys.
pub fn merge_delta(target: &mut AttributeMap, delta: &AttributeMap) {
    for (key, value) in delta {
        target.insert(key.clone(), value.clone());
    }
}

#[derive(Debug, Default)]
pub struct SharedStateCache {
    states: SharedState,
    turn: TurnDescriptor,
}

impl SharedStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a delta into the participant's cached attribute map, creating
    /// the record on first use. Duplicate or replayed deltas are harmless.
    pub fn apply_delta(&mut self, participant_id: &str, delta: &AttributeMap) {
        let entry = self.states.entry(participant_id.to_owned()).or_default();
        merge_delta(entry, delta);
    }

    /// Replace the entire cache wholesale (explicit game restart).
    pub fn reset(&mut self, shared_state: SharedState, turn: TurnDescriptor) {
        self.states = shared_state;
        self.turn = turn;
    }

    pub fn set_turn(&mut self, turn: TurnDescriptor) {
        self.turn = turn;
    }

    pub fn turn(&self) -> &TurnDescriptor {
        &self.turn
    }

    pub fn attributes(&self, participant_id: &str) -> Option<&AttributeMap> {
        self.states.get(participant_id)
    }

    /// Clone of the full per-participant state, for join snapshots.
    pub fn snapshot(&self) -> SharedState {
        self.states.clone()
    }
}
