//! # pl-optimizer
//!
//! Parameter spaces and the ask/tell suggestion service for Pitlane.
//!
//! Provides per-vehicle parameter catalogs, step-quantized domains, the
//! [`SuggestionService`] / [`SuggestionBackend`] traits the orchestrator
//! consumes, and a seeded in-process [`Study`] backend with random,
//! Parzen-estimator and evolution-strategy samplers.

mod catalog;
mod samplers;
mod space;
mod study;
mod trial;

pub use catalog::VehicleCatalog;
pub use pl_types::ParameterValue;
pub use samplers::{EvolutionSampler, Observation, ParzenSampler, RandomSampler, Sampler};
pub use space::{ParameterKind, ParameterSpace, ParameterSpec};
pub use study::{
    PrunerKind, SamplerKind, Study, StudyBackend, StudySettings, Suggestion, SuggestionBackend,
    SuggestionService,
};
pub use trial::{best_of, TrialId, TrialRecord, TrialState};
