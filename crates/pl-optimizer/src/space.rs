//! Parameter space definitions: per-dimension domains, step grids and the
//! unit-cube encoding used by the samplers.

use pl_types::{config_error, ParameterMap, ParameterValue, PlResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tolerance used when checking grid reachability of float values.
const GRID_TOLERANCE: f64 = 1e-6;
/// Quantized floats are rounded to `1 / SNAP_SCALE`.
const SNAP_SCALE: f64 = 1e9;

/// A single tunable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name (e.g. "front_camber").
    pub name: String,
    #[serde(flatten)]
    pub kind: ParameterKind,
    /// Display unit (e.g. "psi"). Not used for sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Describes how a parameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParameterKind {
    /// Integer range [min, max] inclusive.
    Integer {
        min: i64,
        max: i64,
        #[serde(default)]
        step: Option<i64>,
    },
    /// Continuous range [min, max], optionally on a step grid anchored at `min`.
    Continuous {
        min: f64,
        max: f64,
        #[serde(default)]
        step: Option<f64>,
    },
}

impl ParameterSpec {
    pub fn integer(name: impl Into<String>, min: i64, max: i64, step: Option<i64>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Integer { min, max, step },
            unit: None,
        }
    }

    pub fn continuous(name: impl Into<String>, min: f64, max: f64, step: Option<f64>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Continuous { min, max, step },
            unit: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind, ParameterKind::Integer { .. })
    }

    /// Inclusive bounds as floats.
    pub fn bounds(&self) -> (f64, f64) {
        match self.kind {
            ParameterKind::Integer { min, max, .. } => (min as f64, max as f64),
            ParameterKind::Continuous { min, max, .. } => (min, max),
        }
    }

    /// Grid step as a float, if the parameter is stepped.
    pub fn step(&self) -> Option<f64> {
        match self.kind {
            ParameterKind::Integer { step, .. } => step.map(|s| s as f64),
            ParameterKind::Continuous { step, .. } => step,
        }
    }

    /// Check `min <= max`, finite bounds and a positive step.
    pub fn validate(&self) -> PlResult<()> {
        let (min, max) = self.bounds();
        if !min.is_finite() || !max.is_finite() {
            return Err(config_error!("parameter {}: bounds must be finite", self.name));
        }
        if min > max {
            return Err(config_error!(
                "parameter {}: min {} exceeds max {}",
                self.name,
                min,
                max
            ));
        }
        if let Some(step) = self.step() {
            if !step.is_finite() || step <= 0.0 {
                return Err(config_error!(
                    "parameter {}: step must be positive, got {}",
                    self.name,
                    step
                ));
            }
        }
        Ok(())
    }

    /// Index of the last grid point (grid points are `min + k * step`, `k` in
    /// `0..=max_index`).
    fn max_grid_index(&self, step: f64) -> f64 {
        let (min, max) = self.bounds();
        ((max - min) / step + GRID_TOLERANCE).floor().max(0.0)
    }

    /// Number of reachable values, when the domain is discrete.
    pub fn grid_len(&self) -> Option<u64> {
        match self.kind {
            ParameterKind::Integer { .. } => {
                let step = self.step().unwrap_or(1.0);
                Some(self.max_grid_index(step) as u64 + 1)
            }
            ParameterKind::Continuous { step, .. } => {
                step.map(|s| self.max_grid_index(s) as u64 + 1)
            }
        }
    }

    /// Snap a raw draw onto the domain: clamp to the bounds, then round to the
    /// nearest grid point that does not exceed `max`.
    pub fn quantize(&self, raw: f64) -> ParameterValue {
        let (min, max) = self.bounds();
        let clamped = if raw.is_nan() { min } else { raw.clamp(min, max) };

        match self.kind {
            ParameterKind::Integer { min, step, .. } => {
                let step = step.unwrap_or(1);
                let k = ((clamped - min as f64) / step as f64)
                    .round()
                    .clamp(0.0, self.max_grid_index(step as f64));
                ParameterValue::Int(min + k as i64 * step)
            }
            ParameterKind::Continuous { step: None, .. } => ParameterValue::Float(clamped),
            ParameterKind::Continuous {
                min, step: Some(step), ..
            } => {
                let k = ((clamped - min) / step)
                    .round()
                    .clamp(0.0, self.max_grid_index(step));
                // Strip representation noise (e.g. -1.2999999999999998).
                let snapped = ((min + k * step) * SNAP_SCALE).round() / SNAP_SCALE;
                ParameterValue::Float(snapped.clamp(min, max))
            }
        }
    }

    /// Whether `value` lies within the bounds and on the step grid.
    pub fn contains(&self, value: &ParameterValue) -> bool {
        let (min, max) = self.bounds();
        let v = value.as_f64();
        if self.is_integer() && !matches!(value, ParameterValue::Int(_)) {
            return false;
        }
        if v < min - GRID_TOLERANCE || v > max + GRID_TOLERANCE {
            return false;
        }
        match self.step() {
            Some(step) => {
                let k = (v - min) / step;
                let off_grid = (k - k.round()).abs();
                off_grid < GRID_TOLERANCE || off_grid * step * SNAP_SCALE <= 1.0
            }
            None => true,
        }
    }

    /// Map a value into [0, 1] relative to the bounds.
    pub fn to_unit(&self, value: &ParameterValue) -> f64 {
        let (min, max) = self.bounds();
        if max <= min {
            return 0.5;
        }
        ((value.as_f64() - min) / (max - min)).clamp(0.0, 1.0)
    }

    /// Inverse of [`Self::to_unit`], snapped onto the domain.
    pub fn from_unit(&self, u: f64) -> ParameterValue {
        let (min, max) = self.bounds();
        self.quantize(min + u.clamp(0.0, 1.0) * (max - min))
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSpace {
    pub parameters: Vec<ParameterSpec>,
}

impl ParameterSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn add_int(self, name: impl Into<String>, min: i64, max: i64, step: Option<i64>) -> Self {
        self.add(ParameterSpec::integer(name, min, max, step))
    }

    pub fn add_float(self, name: impl Into<String>, min: f64, max: f64, step: Option<f64>) -> Self {
        self.add(ParameterSpec::continuous(name, min, max, step))
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Validate every spec and reject duplicate names.
    pub fn validate(&self) -> PlResult<()> {
        let mut seen = HashSet::new();
        for spec in &self.parameters {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(config_error!("duplicate parameter: {}", spec.name));
            }
        }
        Ok(())
    }

    /// Decode a unit-cube point into concrete parameter values.
    pub fn decode(&self, point: &[f64]) -> ParameterMap {
        self.parameters
            .iter()
            .zip(point)
            .map(|(spec, u)| (spec.name.clone(), spec.from_unit(*u)))
            .collect()
    }

    /// Encode parameter values into a unit-cube point. Fails on a missing
    /// parameter.
    pub fn encode(&self, params: &ParameterMap) -> Option<Vec<f64>> {
        self.parameters
            .iter()
            .map(|spec| params.get(&spec.name).map(|v| spec.to_unit(v)))
            .collect()
    }

    /// Every parameter present and inside its domain.
    pub fn contains(&self, params: &ParameterMap) -> bool {
        self.parameters.iter().all(|spec| {
            params
                .get(&spec.name)
                .map(|v| spec.contains(v))
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_space() -> ParameterSpace {
        ParameterSpace::new()
            .add_float("front_tire_pressure", 20.0, 32.0, Some(0.5))
            .add_float("front_camber", -5.0, -0.5, Some(0.1))
            .add_int("front_arb", 1, 6, Some(1))
            .add_float("brake_bias", 50.0, 60.0, None)
    }

    #[test]
    fn quantize_snaps_to_grid() {
        let spec = ParameterSpec::continuous("p", 20.0, 32.0, Some(0.5));
        assert_eq!(spec.quantize(26.3), ParameterValue::Float(26.5));
        assert_eq!(spec.quantize(19.0), ParameterValue::Float(20.0));
        assert_eq!(spec.quantize(40.0), ParameterValue::Float(32.0));
    }

    #[test]
    fn wide_grid_rejects_off_grid_values() {
        let spec = ParameterSpec::continuous("x", 0.0, 1_000_000.0, Some(1.0));
        assert!(spec.contains(&ParameterValue::Float(500_000.0)));
        assert!(!spec.contains(&ParameterValue::Float(500_000.4)));
        assert!(!spec.contains(&ParameterValue::Float(999_999.5)));
    }

    #[test]
    fn quantize_strips_float_noise() {
        let spec = ParameterSpec::continuous("camber", -5.0, -0.5, Some(0.1));
        assert_eq!(spec.quantize(-1.3), ParameterValue::Float(-1.3));
    }

    #[test]
    fn uneven_step_never_exceeds_max() {
        // 0, 3, 6, 9 are reachable; 10 is not on the grid.
        let spec = ParameterSpec::integer("wing", 0, 10, Some(3));
        assert_eq!(spec.grid_len(), Some(4));
        assert_eq!(spec.quantize(10.0), ParameterValue::Int(9));
        assert!(!spec.contains(&ParameterValue::Int(10)));
        assert!(spec.contains(&ParameterValue::Int(6)));
    }

    #[test]
    fn integer_contains_rejects_floats() {
        let spec = ParameterSpec::integer("arb", 1, 6, None);
        assert!(spec.contains(&ParameterValue::Int(4)));
        assert!(!spec.contains(&ParameterValue::Float(4.0)));
        assert!(!spec.contains(&ParameterValue::Int(7)));
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let spec = ParameterSpec::continuous("toe", 0.5, -0.5, None);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_step() {
        let spec = ParameterSpec::continuous("toe", -0.5, 0.5, Some(0.0));
        assert!(spec.validate().is_err());
        let spec = ParameterSpec::integer("arb", 1, 6, Some(-1));
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_duplicate_names() {
        let space = ParameterSpace::new()
            .add_int("arb", 1, 6, None)
            .add_int("arb", 1, 6, None);
        assert!(space.validate().is_err());
    }

    #[test]
    fn degenerate_range_is_valid() {
        let spec = ParameterSpec::continuous("fixed", 3.0, 3.0, Some(0.5));
        assert!(spec.validate().is_ok());
        assert_eq!(spec.from_unit(0.7), ParameterValue::Float(3.0));
        assert_eq!(spec.to_unit(&ParameterValue::Float(3.0)), 0.5);
    }

    #[test]
    fn encode_decode_keeps_values_in_domain() {
        let space = sample_space();
        let params = space.decode(&[0.0, 0.5, 1.0, 0.25]);
        assert!(space.contains(&params));
        assert_eq!(params["front_arb"], ParameterValue::Int(6));
        assert_eq!(params["front_tire_pressure"], ParameterValue::Float(20.0));

        let point = space.encode(&params).unwrap();
        assert_eq!(point.len(), 4);
        assert!(point.iter().all(|u| (0.0..=1.0).contains(u)));
    }

    #[test]
    fn encode_fails_on_missing_parameter() {
        let space = sample_space();
        let mut params = space.decode(&[0.1, 0.1, 0.1, 0.1]);
        params.remove("front_arb");
        assert!(space.encode(&params).is_none());
        assert!(!space.contains(&params));
    }

    #[test]
    fn spec_json_shape() {
        let json = r#"{
            "name": "front_arb", "kind": "integer",
            "min": 1, "max": 6, "step": 1, "unit": "position"
        }"#;
        let spec: ParameterSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, ParameterSpec::integer("front_arb", 1, 6, Some(1)).with_unit("position"));
    }

    proptest! {
        #[test]
        fn from_unit_is_always_in_domain(
            u in -0.5f64..1.5,
            lo in -50.0f64..50.0,
            width in 0.0f64..40.0,
            step in 0.01f64..5.0,
        ) {
            let spec = ParameterSpec::continuous("x", lo, lo + width, Some(step));
            let value = spec.from_unit(u);
            prop_assert!(spec.contains(&value), "{value:?} not in {spec:?}");
        }

        #[test]
        fn integer_from_unit_is_always_in_domain(
            u in 0.0f64..=1.0,
            lo in -20i64..20,
            width in 0i64..40,
            step in 1i64..7,
        ) {
            let spec = ParameterSpec::integer("n", lo, lo + width, Some(step));
            let value = spec.from_unit(u);
            prop_assert!(spec.contains(&value), "{value:?} not in {spec:?}");
        }
    }
}
