use thiserror::Error;

use crate::session::SessionId;
use crate::setup::SetupId;

/// Main error type for Pitlane
#[derive(Error, Debug)]
pub enum PlError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session conflict: session {active_session_id} is already active")]
    Conflict { active_session_id: SessionId },

    #[error("No active optimization session")]
    InactiveSession,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Suggestion error: {0}")]
    Suggestion(#[from] SuggestionError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A store reported failure (`None`/`false`) for an operation.
///
/// Stores swallow backend errors at their own boundary; the variant records
/// which request was refused so callers can log and abort.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to create setup for {vehicle_id}/{track_id}")]
    SetupCreate { vehicle_id: String, track_id: String },

    #[error("failed to update setup {setup_id}")]
    SetupUpdate { setup_id: SetupId },

    #[error("failed to create session for {vehicle_id}/{track_id}")]
    SessionCreate { vehicle_id: String, track_id: String },

    #[error("failed to record best setup {setup_id} on session {session_id}")]
    SessionUpdate {
        session_id: SessionId,
        setup_id: SetupId,
    },

    #[error("failed to close session {session_id}")]
    SessionClose { session_id: SessionId },

    #[error("failed to append telemetry for setup {setup_id}")]
    TelemetryAppend { setup_id: SetupId },
}

impl StoreError {
    /// Short operation label used in structured logs.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::SetupCreate { .. } => "setup.create",
            Self::SetupUpdate { .. } => "setup.update_status",
            Self::SessionCreate { .. } => "session.create",
            Self::SessionUpdate { .. } => "session.update_best",
            Self::SessionClose { .. } => "session.close",
            Self::TelemetryAppend { .. } => "telemetry.append",
        }
    }
}

/// Errors raised inside a suggestion service handle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SuggestionError {
    #[error("unknown trial token: {token}")]
    UnknownTrial { token: u64 },

    #[error("parameter domain is empty")]
    EmptyDomain,

    #[error("parameter {name} does not fit the domain: {message}")]
    OutOfDomain { name: String, message: String },
}

/// Result type alias for Pitlane operations
pub type PlResult<T> = Result<T, PlError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::PlError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::PlError::Config(format!($($arg)*))
    };
}
