//! Telemetry scoring for Pitlane.
//!
//! Turns a heterogeneous bag of lap metrics into one reward in [0, 1]:
//! - per-metric rules (weight, orientation, optional ideal range)
//! - history-relative min-max normalization
//! - weighted average over the metrics actually present

pub mod config;
pub mod engine;

pub use config::{IdealRange, MetricRule, Orientation, ScoringConfig};
pub use engine::{MetricContribution, ScoreBreakdown, ScoringEngine};
