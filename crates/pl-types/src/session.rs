//! Optimization sessions and their configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::setup::SetupId;

/// Store-assigned session identifier.
pub type SessionId = i64;

/// Whether we are maximizing or minimizing the reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveDirection {
    #[default]
    Maximize,
    Minimize,
}

impl ObjectiveDirection {
    /// `true` if `candidate` beats `incumbent` in this direction.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }
}

/// Per-session optimization knobs, stored verbatim on the session record.
///
/// Sampler and pruner stay free-form names here; they are resolved into
/// closed strategy kinds when the suggestion service is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConfig {
    /// Overall trial budget handed to the suggestion service.
    pub n_trials: usize,
    /// Overall time budget of the suggestion service, in seconds.
    pub timeout_secs: u64,
    /// "tpe", "cmaes" or "random".
    pub sampler: String,
    /// "hyperband", "median" or "none".
    pub pruner: String,
    pub direction: ObjectiveDirection,
    pub seed: u64,
    /// Size of the warm-start batch asked before any feedback arrives.
    pub initial_setups: usize,
    /// Exploration share for model-based samplers.
    pub exploration_weight: f64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            n_trials: 30,
            timeout_secs: 86_400,
            sampler: "tpe".to_string(),
            pruner: "hyperband".to_string(),
            direction: ObjectiveDirection::Maximize,
            seed: 42,
            initial_setups: 5,
            exploration_weight: 0.3,
        }
    }
}

impl OptimizationConfig {
    pub fn with_sampler(mut self, sampler: &str) -> Self {
        self.sampler = sampler.to_string();
        self
    }

    pub fn with_pruner(mut self, pruner: &str) -> Self {
        self.pruner = pruner.to_string();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_initial_setups(mut self, n: usize) -> Self {
        self.initial_setups = n;
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }
}

/// A persisted optimization session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub vehicle_id: String,
    pub track_id: String,
    pub config: OptimizationConfig,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub best_setup_id: Option<SetupId>,
}

impl SessionRecord {
    pub fn new(
        id: SessionId,
        vehicle_id: impl Into<String>,
        track_id: impl Into<String>,
        config: OptimizationConfig,
    ) -> Self {
        Self {
            id,
            vehicle_id: vehicle_id.into(),
            track_id: track_id.into(),
            config,
            start_time: Utc::now(),
            end_time: None,
            best_setup_id: None,
        }
    }

    /// Active until closed.
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn close(&mut self) {
        self.end_time = Some(Utc::now());
    }
}
