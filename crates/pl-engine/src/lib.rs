//! Pitlane optimization engine.
//!
//! Ties the parameter catalog, the suggestion service and the scorer to the
//! setup, session and telemetry stores:
//! - [`Orchestrator`]: session lifecycle and the ask/persist/score/tell loop
//! - store traits plus in-memory implementations
//! - layered configuration and logging setup for the `pitlane` binary

pub mod config;
pub mod events;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod store;

pub use config::{ConfigError, ConfigLoader, LoggingConfig, PitlaneConfig, ResubmissionPolicy};
pub use events::{EventBus, OrchestratorEvent};
pub use logging::init_logging;
pub use memory::{MemorySessionStore, MemorySetupStore, MemoryTelemetryStore};
pub use orchestrator::{IngestOutcome, OptimizationStatus, Orchestrator};
pub use store::{SessionStore, SetupStore, Stores, TelemetryStore};
