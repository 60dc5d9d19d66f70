//! Trial tracking inside a suggestion study.

use chrono::{DateTime, Utc};
use pl_types::{ObjectiveDirection, ParameterMap};
use serde::{Deserialize, Serialize};

/// Opaque token identifying one trial of a study.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialId(pub u64);

impl std::fmt::Display for TrialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "trial-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrialState {
    /// Handed out by `ask`, no reward yet.
    Asked,
    /// Reward observed.
    Told { reward: f64 },
}

/// A single trial (one parameter vector proposed by the study).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub id: TrialId,
    pub parameters: ParameterMap,
    /// Unit-cube coordinates, in parameter-space order.
    pub point: Vec<f64>,
    pub state: TrialState,
    pub created_at: DateTime<Utc>,
    pub told_at: Option<DateTime<Utc>>,
}

impl TrialRecord {
    pub fn new(id: TrialId, parameters: ParameterMap, point: Vec<f64>) -> Self {
        Self {
            id,
            parameters,
            point,
            state: TrialState::Asked,
            created_at: Utc::now(),
            told_at: None,
        }
    }

    /// Record (or replace) the observed reward.
    pub fn mark_told(&mut self, reward: f64) {
        self.state = TrialState::Told { reward };
        self.told_at = Some(Utc::now());
    }

    pub fn reward(&self) -> Option<f64> {
        match self.state {
            TrialState::Told { reward } => Some(reward),
            TrialState::Asked => None,
        }
    }

    /// Reward oriented so that larger is better in `direction`.
    pub fn utility(&self, direction: ObjectiveDirection) -> Option<f64> {
        self.reward().map(|r| match direction {
            ObjectiveDirection::Maximize => r,
            ObjectiveDirection::Minimize => -r,
        })
    }
}

/// Best told trial in `direction`; ties keep the earliest trial.
pub fn best_of<'a>(
    trials: impl IntoIterator<Item = &'a TrialRecord>,
    direction: ObjectiveDirection,
) -> Option<(TrialId, f64)> {
    let mut best: Option<(TrialId, f64)> = None;
    for trial in trials {
        let Some(reward) = trial.reward() else {
            continue;
        };
        let dominated = match best {
            None => true,
            Some((_, current)) => direction.improves(reward, current),
        };
        if dominated {
            best = Some((trial.id, reward));
        }
    }
    best
}
