//! In-memory store implementations.
//!
//! Setups sit in a `DashMap` so per-record updates only take that entry's
//! shard lock. Sessions share one `RwLock` so the single-active-session check
//! and the insert happen atomically.

use dashmap::DashMap;
use parking_lot::RwLock;
use pl_types::{
    NewSetup, OptimizationConfig, SessionId, SessionRecord, SetupId, SetupRecord, SetupStatus,
    TelemetryEvent, TelemetryId, TelemetryRecord,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use tracing::{debug, warn};

use crate::store::{SessionStore, SetupStore, TelemetryStore};

/// Hands out ids starting at 1.
#[derive(Debug, Default)]
struct IdSequence(AtomicI64);

impl IdSequence {
    fn next(&self) -> i64 {
        self.0.fetch_add(1, AtomicOrdering::SeqCst) + 1
    }
}

#[derive(Debug, Default)]
pub struct MemorySetupStore {
    records: DashMap<SetupId, SetupRecord>,
    ids: IdSequence,
}

impl MemorySetupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn collect_sorted<F>(&self, filter: F) -> Vec<SetupRecord>
    where
        F: Fn(&SetupRecord) -> bool,
    {
        let mut out: Vec<SetupRecord> = self
            .records
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(|r| r.id);
        out
    }
}

impl SetupStore for MemorySetupStore {
    fn create(&self, setup: NewSetup) -> Option<SetupId> {
        let id = self.ids.next();
        self.records.insert(id, SetupRecord::from_new(id, setup));
        Some(id)
    }

    fn get(&self, id: SetupId) -> Option<SetupRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    fn update_status(&self, id: SetupId, status: SetupStatus, score: Option<f64>) -> bool {
        let Some(mut record) = self.records.get_mut(&id) else {
            warn!(setup_id = id, "status update for unknown setup");
            return false;
        };
        if !record.status.can_transition_to(status) {
            warn!(setup_id = id, from = %record.status, to = %status, "refused status transition");
            return false;
        }
        record.status = status;
        if score.is_some() {
            record.score = score;
        }
        debug!(setup_id = id, %status, ?score, "setup updated");
        true
    }

    fn get_pending(&self) -> Option<SetupRecord> {
        self.records
            .iter()
            .filter(|entry| entry.is_pending())
            .min_by_key(|entry| (entry.generation_time, entry.id))
            .map(|entry| entry.value().clone())
    }

    fn get_best(&self, vehicle_id: &str, track_id: &str, limit: usize) -> Vec<SetupRecord> {
        let mut best = self.collect_sorted(|r| {
            r.vehicle_id == vehicle_id && r.track_id == track_id && r.is_scored()
        });
        // Stable sort keeps creation order among equal scores.
        best.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
        });
        best.truncate(limit);
        best
    }

    fn list_for_session(&self, session_id: SessionId) -> Vec<SetupRecord> {
        self.collect_sorted(|r| r.session_id == Some(session_id))
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<BTreeMap<SessionId, SessionRecord>>,
    ids: IdSequence,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<SessionRecord> {
        self.sessions.read().values().cloned().collect()
    }
}

impl SessionStore for MemorySessionStore {
    fn create(
        &self,
        vehicle_id: &str,
        track_id: &str,
        config: &OptimizationConfig,
    ) -> Option<SessionId> {
        let mut sessions = self.sessions.write();
        if let Some(active) = sessions.values().find(|s| s.is_active()) {
            warn!(active_session_id = active.id, "refusing second active session");
            return None;
        }
        let id = self.ids.next();
        sessions.insert(id, SessionRecord::new(id, vehicle_id, track_id, config.clone()));
        Some(id)
    }

    fn get(&self, id: SessionId) -> Option<SessionRecord> {
        self.sessions.read().get(&id).cloned()
    }

    fn get_active(&self) -> Option<SessionRecord> {
        self.sessions
            .read()
            .values()
            .rev()
            .find(|s| s.is_active())
            .cloned()
    }

    fn update_best(&self, session_id: SessionId, setup_id: SetupId) -> bool {
        match self.sessions.write().get_mut(&session_id) {
            Some(session) => {
                session.best_setup_id = Some(setup_id);
                true
            }
            None => false,
        }
    }

    fn close(&self, session_id: SessionId) -> bool {
        match self.sessions.write().get_mut(&session_id) {
            Some(session) if session.is_active() => {
                session.close();
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTelemetryStore {
    records: RwLock<Vec<TelemetryRecord>>,
    ids: IdSequence,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl TelemetryStore for MemoryTelemetryStore {
    fn append(&self, event: &TelemetryEvent) -> Option<TelemetryId> {
        let id = self.ids.next();
        self.records.write().push(TelemetryRecord::from_event(id, event));
        Some(id)
    }

    fn for_setup(&self, setup_id: SetupId) -> Vec<TelemetryRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.setup_id == setup_id)
            .cloned()
            .collect()
    }
}
