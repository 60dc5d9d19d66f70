//! Telemetry submissions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::setup::SetupId;

/// Store-assigned telemetry identifier.
pub type TelemetryId = i64;

/// Metric name to raw value.
pub type MetricMap = BTreeMap<String, f64>;

/// Metric key under which the lap time is scored.
pub const LAP_TIME_METRIC: &str = "lap_time";

/// One telemetry submission as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub setup_id: SetupId,
    /// Lap time in seconds.
    pub lap_time: f64,
    #[serde(default, alias = "telemetry_data")]
    pub metric_map: MetricMap,
    #[serde(default, alias = "weather_conditions")]
    pub weather: Option<serde_json::Value>,
    #[serde(default, alias = "driver_notes")]
    pub notes: Option<String>,
}

impl TelemetryEvent {
    pub fn new(setup_id: SetupId, lap_time: f64) -> Self {
        Self {
            setup_id,
            lap_time,
            metric_map: MetricMap::new(),
            weather: None,
            notes: None,
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metric_map.insert(name.into(), value);
        self
    }

    /// The sample handed to the scorer: the metric map with `lap_time`
    /// filled in from the dedicated field unless already present.
    pub fn sample(&self) -> MetricMap {
        let mut sample = self.metric_map.clone();
        sample
            .entry(LAP_TIME_METRIC.to_string())
            .or_insert(self.lap_time);
        sample
    }
}

/// A persisted, append-only telemetry observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub id: TelemetryId,
    pub setup_id: SetupId,
    pub lap_time: f64,
    pub metric_map: MetricMap,
    pub submission_time: DateTime<Utc>,
    pub weather: Option<serde_json::Value>,
    pub notes: Option<String>,
}

impl TelemetryRecord {
    pub fn from_event(id: TelemetryId, event: &TelemetryEvent) -> Self {
        Self {
            id,
            setup_id: event.setup_id,
            lap_time: event.lap_time,
            metric_map: event.metric_map.clone(),
            submission_time: Utc::now(),
            weather: event.weather.clone(),
            notes: event.notes.clone(),
        }
    }

    /// Same merge as [`TelemetryEvent::sample`].
    pub fn sample(&self) -> MetricMap {
        let mut sample = self.metric_map.clone();
        sample
            .entry(LAP_TIME_METRIC.to_string())
            .or_insert(self.lap_time);
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_merges_lap_time() {
        let event = TelemetryEvent::new(4, 92.31).with_metric("traction", 7.0);
        let sample = event.sample();
        assert_eq!(sample.get("lap_time"), Some(&92.31));
        assert_eq!(sample.get("traction"), Some(&7.0));
    }

    #[test]
    fn explicit_lap_time_metric_wins() {
        let event = TelemetryEvent::new(4, 92.31).with_metric("lap_time", 91.0);
        assert_eq!(event.sample().get("lap_time"), Some(&91.0));
    }

    #[test]
    fn accepts_legacy_field_names() {
        let json = r#"{
            "setup_id": 3,
            "lap_time": 101.2,
            "telemetry_data": {"car_stability": 6.5},
            "weather_conditions": {"air_temp": 21},
            "driver_notes": "loose on exit"
        }"#;
        let event: TelemetryEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.setup_id, 3);
        assert_eq!(event.metric_map.get("car_stability"), Some(&6.5));
        assert_eq!(event.notes.as_deref(), Some("loose on exit"));
        assert!(event.weather.is_some());
    }

    #[test]
    fn metric_map_is_optional() {
        let event: TelemetryEvent =
            serde_json::from_str(r#"{"setup_id": 1, "lap_time": 88.0}"#).unwrap();
        assert!(event.metric_map.is_empty());
        assert_eq!(event.sample().len(), 1);
    }
}
