//! Static per-metric scoring rules.

use pl_types::{config_error, PlResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether higher or lower raw values are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    HigherIsBetter,
    LowerIsBetter,
}

/// Target band for a metric. Values inside score 1.0; overshoot is penalized
/// twice as steeply as undershoot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdealRange {
    pub low: f64,
    pub high: f64,
}

impl IdealRange {
    /// Penalty per unit below `low`.
    pub const UNDERSHOOT_SLOPE: f64 = 0.1;
    /// Penalty per unit above `high`.
    pub const OVERSHOOT_SLOPE: f64 = 0.2;

    pub fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }

    /// Shaped contribution in [0, 1].
    pub fn shape(&self, value: f64) -> f64 {
        let shaped = if self.contains(value) {
            1.0
        } else if value < self.low {
            1.0 - Self::UNDERSHOOT_SLOPE * (self.low - value)
        } else {
            1.0 - Self::OVERSHOOT_SLOPE * (value - self.high)
        };
        shaped.max(0.0)
    }
}

/// Scoring rule for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRule {
    pub weight: f64,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_range: Option<IdealRange>,
}

impl MetricRule {
    pub fn higher(weight: f64) -> Self {
        Self {
            weight,
            orientation: Orientation::HigherIsBetter,
            ideal_range: None,
        }
    }

    pub fn lower(weight: f64) -> Self {
        Self {
            weight,
            orientation: Orientation::LowerIsBetter,
            ideal_range: None,
        }
    }

    pub fn band(weight: f64, low: f64, high: f64) -> Self {
        Self {
            weight,
            orientation: Orientation::HigherIsBetter,
            ideal_range: Some(IdealRange::new(low, high)),
        }
    }
}

/// The metrics the scorer tracks, keyed by metric name. Metrics outside this
/// table are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub metrics: BTreeMap<String, MetricRule>,
}

const TIRES: [&str; 4] = ["fl", "fr", "rl", "rr"];

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut metrics = BTreeMap::new();
        // Lap time dominates.
        metrics.insert("lap_time".to_string(), MetricRule::lower(10.0));
        for tire in TIRES {
            // Degrees C
            metrics.insert(format!("tire_avg_temp_{tire}"), MetricRule::band(1.0, 80.0, 90.0));
            metrics.insert(format!("tire_wear_{tire}"), MetricRule::lower(2.0));
        }
        // Driver ratings, 1-10.
        metrics.insert("car_stability".to_string(), MetricRule::higher(3.0));
        metrics.insert("corner_entry_stability".to_string(), MetricRule::higher(2.0));
        metrics.insert("corner_exit_stability".to_string(), MetricRule::higher(2.0));
        metrics.insert("traction".to_string(), MetricRule::higher(3.0));
        metrics.insert("braking_stability".to_string(), MetricRule::higher(2.0));
        Self { metrics }
    }
}

impl ScoringConfig {
    pub fn empty() -> Self {
        Self {
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, metric: impl Into<String>, rule: MetricRule) -> Self {
        self.metrics.insert(metric.into(), rule);
        self
    }

    /// Replace the weight table. Orientation and ideal ranges of known
    /// metrics are kept from the defaults; unknown metrics are higher-is-better.
    pub fn with_weights<I, K>(weights: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let defaults = Self::default();
        let metrics = weights
            .into_iter()
            .map(|(name, weight)| {
                let name = name.into();
                let rule = defaults
                    .metrics
                    .get(&name)
                    .map(|r| MetricRule { weight, ..*r })
                    .unwrap_or_else(|| MetricRule::higher(weight));
                (name, rule)
            })
            .collect();
        Self { metrics }
    }

    pub fn rule(&self, metric: &str) -> Option<&MetricRule> {
        self.metrics.get(metric)
    }

    pub fn validate(&self) -> PlResult<()> {
        for (name, rule) in &self.metrics {
            if !rule.weight.is_finite() || rule.weight <= 0.0 {
                return Err(config_error!(
                    "metric {name}: weight must be positive, got {}",
                    rule.weight
                ));
            }
            if let Some(range) = rule.ideal_range {
                if !(range.low.is_finite() && range.high.is_finite()) || range.low > range.high {
                    return Err(config_error!(
                        "metric {name}: invalid ideal range ({}, {})",
                        range.low,
                        range.high
                    ));
                }
            }
        }
        Ok(())
    }
}
