//! Per-vehicle parameter catalog.

use pl_types::{config_error, PlResult};
use std::collections::BTreeMap;

use crate::space::{ParameterSpace, ParameterSpec};

/// Maps vehicle ids to their tunable parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleCatalog {
    vehicles: BTreeMap<String, ParameterSpace>,
}

impl VehicleCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            vehicles: BTreeMap::new(),
        }
    }

    /// Catalog preloaded with the built-in vehicles.
    pub fn builtin() -> Self {
        let mut vehicles = BTreeMap::new();
        vehicles.insert("mx5".to_string(), mx5_space());
        vehicles.insert("f3".to_string(), f3_space());
        Self { vehicles }
    }

    /// Parse a catalog from JSON: `{"vehicle_id": [ParameterSpec, ...], ...}`.
    /// Every space is validated.
    pub fn from_json(json: &str) -> PlResult<Self> {
        let raw: BTreeMap<String, ParameterSpace> = serde_json::from_str(json)?;
        let mut catalog = Self::empty();
        for (vehicle_id, space) in raw {
            catalog.register(vehicle_id, space)?;
        }
        Ok(catalog)
    }

    /// Add or replace a vehicle after validating its space.
    pub fn register(
        &mut self,
        vehicle_id: impl Into<String>,
        space: ParameterSpace,
    ) -> PlResult<()> {
        let vehicle_id = vehicle_id.into();
        if space.is_empty() {
            return Err(config_error!("vehicle {vehicle_id} has no parameters"));
        }
        space
            .validate()
            .map_err(|e| config_error!("vehicle {vehicle_id}: {e}"))?;
        self.vehicles.insert(vehicle_id, space);
        Ok(())
    }

    /// Register every vehicle of `other`, replacing same-named entries.
    pub fn extend(&mut self, other: VehicleCatalog) {
        self.vehicles.extend(other.vehicles);
    }

    /// The ordered parameter domain for `vehicle_id`.
    pub fn domain_for(&self, vehicle_id: &str) -> PlResult<&ParameterSpace> {
        self.vehicles
            .get(vehicle_id)
            .ok_or_else(|| config_error!("no parameter configuration for vehicle: {vehicle_id}"))
    }

    pub fn vehicle_ids(&self) -> impl Iterator<Item = &str> {
        self.vehicles.keys().map(String::as_str)
    }

    pub fn contains(&self, vehicle_id: &str) -> bool {
        self.vehicles.contains_key(vehicle_id)
    }
}

impl Default for VehicleCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

fn mx5_space() -> ParameterSpace {
    ParameterSpace::new()
        .add(
            ParameterSpec::continuous("front_tire_pressure", 20.0, 32.0, Some(0.5))
                .with_unit("psi"),
        )
        .add(
            ParameterSpec::continuous("rear_tire_pressure", 20.0, 32.0, Some(0.5))
                .with_unit("psi"),
        )
        .add(ParameterSpec::continuous("front_camber", -5.0, -0.5, Some(0.1)).with_unit("deg"))
        .add(ParameterSpec::continuous("rear_camber", -5.0, -0.5, Some(0.1)).with_unit("deg"))
        .add(ParameterSpec::continuous("front_toe", -0.5, 0.5, Some(0.01)).with_unit("deg"))
        .add(ParameterSpec::continuous("rear_toe", -0.5, 0.5, Some(0.01)).with_unit("deg"))
        .add(ParameterSpec::integer("front_arb", 1, 6, Some(1)).with_unit("position"))
        .add(ParameterSpec::integer("rear_arb", 1, 6, Some(1)).with_unit("position"))
}

fn f3_space() -> ParameterSpace {
    ParameterSpace::new()
        .add(ParameterSpec::integer("front_wing", 1, 40, Some(1)).with_unit("position"))
        .add(ParameterSpec::integer("rear_wing", 1, 40, Some(1)).with_unit("position"))
        .add(
            ParameterSpec::continuous("front_tire_pressure", 17.0, 25.0, Some(0.1))
                .with_unit("psi"),
        )
        .add(
            ParameterSpec::continuous("rear_tire_pressure", 17.0, 25.0, Some(0.1))
                .with_unit("psi"),
        )
        .add(ParameterSpec::continuous("front_camber", -5.0, -1.0, Some(0.1)).with_unit("deg"))
        .add(ParameterSpec::continuous("rear_camber", -5.0, -1.0, Some(0.1)).with_unit("deg"))
}
