//! Score computation.
//!
//! [`ScoringEngine`] keeps an append-only history per tracked metric and turns
//! a raw telemetry sample into a single weighted reward.

use pl_types::MetricMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

use crate::config::{Orientation, ScoringConfig};

/// Append-only value history with running bounds.
#[derive(Debug, Clone, Default, PartialEq)]
struct MetricHistory {
    values: Vec<f64>,
    min: f64,
    max: f64,
}

impl MetricHistory {
    fn push(&mut self, value: f64) {
        if self.values.is_empty() {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.values.push(value);
    }
}

/// Contribution of a single metric to a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricContribution {
    pub value: f64,
    pub normalized: f64,
    pub weight: f64,
}

/// Score together with its per-metric breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub total: f64,
    /// Sum of the weights of the metrics that were present.
    pub total_weight: f64,
    pub contributions: BTreeMap<String, MetricContribution>,
}

/// Multi-metric scorer.
///
/// History grows for the lifetime of the instance; normalization of a metric
/// is always relative to every value seen so far.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    history: HashMap<String, MetricHistory>,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            config,
            history: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Values recorded so far for `metric`.
    pub fn history(&self, metric: &str) -> Option<&[f64]> {
        self.history.get(metric).map(|h| h.values.as_slice())
    }

    /// Drop all history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Append each tracked, finite metric of `sample` to its history.
    pub fn update_history(&mut self, sample: &MetricMap) {
        for (metric, value) in sample {
            if !value.is_finite() || self.config.rule(metric).is_none() {
                continue;
            }
            self.history.entry(metric.clone()).or_default().push(*value);
        }
    }

    /// Map `value` into [0, 1] for `metric`.
    ///
    /// Without history the raw value is returned unchanged.
    pub fn normalize(&self, metric: &str, value: f64) -> f64 {
        let Some(history) = self.history.get(metric).filter(|h| !h.values.is_empty()) else {
            return value;
        };
        let rule = self.config.rule(metric);

        if let Some(range) = rule.and_then(|r| r.ideal_range) {
            return range.shape(value);
        }

        if history.min == history.max {
            return 0.5;
        }

        let normalized = ((value - history.min) / (history.max - history.min)).clamp(0.0, 1.0);
        match rule.map(|r| r.orientation).unwrap_or_default() {
            Orientation::HigherIsBetter => normalized,
            Orientation::LowerIsBetter => 1.0 - normalized,
        }
    }

    /// Update history, then score `sample`.
    pub fn score_breakdown(&mut self, sample: &MetricMap) -> ScoreBreakdown {
        self.update_history(sample);

        let mut contributions = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for (metric, value) in sample {
            let Some(rule) = self.config.rule(metric) else {
                continue;
            };
            if !value.is_finite() {
                continue;
            }
            let normalized = self.normalize(metric, *value);
            weighted_sum += normalized * rule.weight;
            total_weight += rule.weight;
            contributions.insert(
                metric.clone(),
                MetricContribution {
                    value: *value,
                    normalized,
                    weight: rule.weight,
                },
            );
        }

        // Missing metrics do not count against the average.
        let total = if total_weight == 0.0 {
            0.0
        } else {
            weighted_sum / total_weight
        };
        trace!(total, total_weight, metrics = contributions.len(), "scored sample");

        ScoreBreakdown {
            total,
            total_weight,
            contributions,
        }
    }

    /// Update history, then compute the weighted average of normalized metrics.
    pub fn calculate_score(&mut self, sample: &MetricMap) -> f64 {
        self.score_breakdown(sample).total
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
