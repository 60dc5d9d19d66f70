//! Persistence interfaces consumed by the orchestrator.
//!
//! Stores report failure through `None` / `false` sentinels and never return
//! backend errors; the orchestrator turns a refusal into a
//! [`StoreError`](pl_types::StoreError) for the operation that hit it.

use pl_types::{
    NewSetup, OptimizationConfig, SessionId, SessionRecord, SetupId, SetupRecord, SetupStatus,
    TelemetryEvent, TelemetryId, TelemetryRecord,
};
use std::sync::Arc;

use crate::memory::{MemorySessionStore, MemorySetupStore, MemoryTelemetryStore};

/// Candidate setups.
pub trait SetupStore: Send + Sync {
    fn create(&self, setup: NewSetup) -> Option<SetupId>;

    fn get(&self, id: SetupId) -> Option<SetupRecord>;

    /// Move a setup to `status`, recording `score` when given. Refused
    /// transitions return `false`.
    fn update_status(&self, id: SetupId, status: SetupStatus, score: Option<f64>) -> bool;

    /// Oldest pending setup.
    fn get_pending(&self) -> Option<SetupRecord>;

    /// Tested, scored setups for a vehicle/track pair, best score first.
    fn get_best(&self, vehicle_id: &str, track_id: &str, limit: usize) -> Vec<SetupRecord>;

    /// Every setup proposed within `session_id`, in creation order.
    fn list_for_session(&self, session_id: SessionId) -> Vec<SetupRecord>;
}

/// Optimization sessions.
pub trait SessionStore: Send + Sync {
    fn create(
        &self,
        vehicle_id: &str,
        track_id: &str,
        config: &OptimizationConfig,
    ) -> Option<SessionId>;

    fn get(&self, id: SessionId) -> Option<SessionRecord>;

    /// The session without an end time, if any.
    fn get_active(&self) -> Option<SessionRecord>;

    fn update_best(&self, session_id: SessionId, setup_id: SetupId) -> bool;

    fn close(&self, session_id: SessionId) -> bool;
}

/// Append-only telemetry log.
pub trait TelemetryStore: Send + Sync {
    fn append(&self, event: &TelemetryEvent) -> Option<TelemetryId>;

    fn for_setup(&self, setup_id: SetupId) -> Vec<TelemetryRecord>;
}

/// The three stores an orchestrator works against.
#[derive(Clone)]
pub struct Stores {
    pub setups: Arc<dyn SetupStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
}

impl Stores {
    pub fn new(
        setups: Arc<dyn SetupStore>,
        sessions: Arc<dyn SessionStore>,
        telemetry: Arc<dyn TelemetryStore>,
    ) -> Self {
        Self {
            setups,
            sessions,
            telemetry,
        }
    }

    /// Fresh in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemorySetupStore::new()),
            Arc::new(MemorySessionStore::new()),
            Arc::new(MemoryTelemetryStore::new()),
        )
    }
}

impl std::fmt::Debug for Stores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}
