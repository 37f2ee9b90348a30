//! Room state registry and create-or-update reconciliation
//!
//! The registry is the single source of truth for sensor consumers. It is
//! owned explicitly and shared by `Arc`; all writes for one batch happen
//! under a single write lock. Entries are never removed: a room missing from
//! the latest batch keeps its last known state.

use crate::domain::types::{RoomId, RoomState, RoomStatus};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

/// roomId → RoomState
#[derive(Default)]
pub struct RoomStateRegistry {
    rooms: RwLock<FxHashMap<RoomId, RoomState>>,
}

impl RoomStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    pub fn contains(&self, room_id: &RoomId) -> bool {
        self.rooms.read().contains_key(room_id)
    }

    pub fn get(&self, room_id: &RoomId) -> Option<RoomState> {
        self.rooms.read().get(room_id).cloned()
    }

    /// All rooms, sorted by room id
    pub fn snapshot(&self) -> Vec<RoomState> {
        let mut rooms: Vec<RoomState> = self.rooms.read().values().cloned().collect();
        rooms.sort_by(|a, b| a.room_id().cmp(b.room_id()));
        rooms
    }
}

/// A room that was already known and received a new sighting
#[derive(Debug, Clone)]
pub struct RoomUpdate {
    pub state: RoomState,
    /// Status before this batch
    pub previous_status: String,
}

impl RoomUpdate {
    pub fn changed(&self) -> bool {
        self.previous_status != self.state.status_code()
    }
}

/// Created and updated rooms from one batch. The two lists never share a room id.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub created: Vec<RoomState>,
    pub updated: Vec<RoomUpdate>,
}

impl ReconcileOutcome {
    pub fn changed_count(&self) -> usize {
        self.updated.iter().filter(|u| u.changed()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }
}

/// Merge a status batch into the registry
///
/// Known rooms are updated in place, unseen rooms are created. A room id
/// repeated within the batch ends up as one entry carrying the last status.
pub fn reconcile(registry: &RoomStateRegistry, statuses: &[RoomStatus]) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    // Position of each room in `created` / `updated` for in-batch repeats
    let mut created_at: FxHashMap<RoomId, usize> = FxHashMap::default();
    let mut updated_at: FxHashMap<RoomId, usize> = FxHashMap::default();

    let mut rooms = registry.rooms.write();

    for status in statuses {
        let room_id = &status.room_id;

        match rooms.entry(room_id.clone()) {
            Entry::Occupied(mut entry) => {
                let state = entry.get_mut();

                if let Some(&idx) = created_at.get(room_id) {
                    warn!(room_id = %room_id, "room_repeated_in_batch");
                    state.apply(&status.status_code);
                    outcome.created[idx] = state.clone();
                    continue;
                }

                let previous_status = state.status_code().to_string();
                state.apply(&status.status_code);

                match updated_at.get(room_id) {
                    Some(&idx) => {
                        warn!(room_id = %room_id, "room_repeated_in_batch");
                        outcome.updated[idx].state = state.clone();
                    }
                    None => {
                        updated_at.insert(room_id.clone(), outcome.updated.len());
                        outcome.updated.push(RoomUpdate { state: state.clone(), previous_status });
                    }
                }
            }
            Entry::Vacant(entry) => {
                let state = RoomState::new(status);
                debug!(room_id = %room_id, status = %state.status_code(), "room_created");
                created_at.insert(room_id.clone(), outcome.created.len());
                outcome.created.push(state.clone());
                entry.insert(state);
            }
        }
    }

    outcome
}
