//! Setup (candidate) records and the exported setup artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::session::SessionId;

/// Store-assigned setup identifier.
pub type SetupId = i64;

/// Version tag written into every exported artifact.
pub const ARTIFACT_VERSION: &str = "1.0";

/// A concrete parameter value, either sampled by the optimizer or entered
/// manually.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
        }
    }
}

/// Parameter name to value, ordered by name for stable serialization.
pub type ParameterMap = BTreeMap<String, ParameterValue>;

/// Lifecycle status of a setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupStatus {
    /// Waiting to be driven.
    Pending,
    /// Driven, score attached.
    Tested,
    /// Dropped without a result.
    Discarded,
}

impl SetupStatus {
    /// Whether a store may move a setup from `self` to `next`.
    ///
    /// Tested setups can be re-scored but never return to pending.
    pub fn can_transition_to(self, next: SetupStatus) -> bool {
        match (self, next) {
            (Self::Pending, _) => true,
            (Self::Tested, Self::Tested) => true,
            (Self::Discarded, Self::Discarded) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SetupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Tested => "tested",
            Self::Discarded => "discarded",
        };
        f.write_str(label)
    }
}

/// Where a setup came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupSource {
    Initial,
    #[serde(alias = "optimized")]
    Optimizer,
    Manual,
}

/// Request to persist a new setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSetup {
    pub vehicle_id: String,
    pub track_id: String,
    pub parameters: ParameterMap,
    pub status: SetupStatus,
    pub source: SetupSource,
    pub session_id: Option<SessionId>,
}

impl NewSetup {
    /// A pending, optimizer-sourced setup belonging to `session_id`.
    pub fn proposed(
        vehicle_id: impl Into<String>,
        track_id: impl Into<String>,
        parameters: ParameterMap,
        session_id: SessionId,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            track_id: track_id.into(),
            parameters,
            status: SetupStatus::Pending,
            source: SetupSource::Optimizer,
            session_id: Some(session_id),
        }
    }

    /// A pending setup entered by hand, outside any session.
    pub fn manual(
        vehicle_id: impl Into<String>,
        track_id: impl Into<String>,
        parameters: ParameterMap,
    ) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            track_id: track_id.into(),
            parameters,
            status: SetupStatus::Pending,
            source: SetupSource::Manual,
            session_id: None,
        }
    }
}

/// A persisted setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupRecord {
    pub id: SetupId,
    pub vehicle_id: String,
    pub track_id: String,
    pub parameters: ParameterMap,
    pub status: SetupStatus,
    pub source: SetupSource,
    pub score: Option<f64>,
    pub session_id: Option<SessionId>,
    pub generation_time: DateTime<Utc>,
}

impl SetupRecord {
    pub fn from_new(id: SetupId, new: NewSetup) -> Self {
        Self {
            id,
            vehicle_id: new.vehicle_id,
            track_id: new.track_id,
            parameters: new.parameters,
            status: new.status,
            source: new.source,
            score: None,
            session_id: new.session_id,
            generation_time: Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == SetupStatus::Pending
    }

    /// Tested with a score attached.
    pub fn is_scored(&self) -> bool {
        self.status == SetupStatus::Tested && self.score.is_some()
    }

    /// Build the downstream artifact for this setup.
    pub fn to_artifact(&self) -> SetupArtifact {
        SetupArtifact::from(self)
    }
}

/// Setup file payload consumed by vehicle-specific generators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetupArtifact {
    pub vehicle: String,
    pub track: String,
    pub settings: ParameterMap,
    pub generated: DateTime<Utc>,
    pub version: String,
}

impl From<&SetupRecord> for SetupArtifact {
    fn from(record: &SetupRecord) -> Self {
        Self {
            vehicle: record.vehicle_id.clone(),
            track: record.track_id.clone(),
            settings: record.parameters.clone(),
            generated: record.generation_time,
            version: ARTIFACT_VERSION.to_string(),
        }
    }
}
