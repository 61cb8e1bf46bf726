//! Code for reading storage units.
use super::{define_param_default, ensure_value, input_err_msg, read_csv_optional};
use crate::bus::BusID;
use crate::error::DispatchError;
use crate::id::{ComponentID, define_id_getter, find_duplicate_id};
use crate::units::{Dimensionless, Energy, MoneyPerEnergy, Power, UnitType};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const STORAGES_FILE_NAME: &str = "storages.csv";

/// The kind of storage unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeLabeledStringEnum)]
pub enum StorageKind {
    /// Pumped hydro energy storage: both charging and discharging are bounded
    #[string = "phes"]
    Phes,
    /// Hydro reservoir with natural inflow: only the turbine is bounded
    #[string = "reservoir"]
    Reservoir,
}

/// A storage unit as given in the input data
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StorageRecord {
    /// Unique identifier
    pub id: ComponentID,
    /// The bidding zone of the storage
    pub country: String,
    /// The kind of storage
    pub kind: StorageKind,
    /// The bus the storage charges from
    pub bus_inflow: BusID,
    /// The bus the storage discharges to
    pub bus_outflow: BusID,
    /// Maximum charging power
    pub capacity_pump: Power,
    /// Maximum discharging power
    pub capacity_turbine: Power,
    /// Maximum energy content
    pub nominal_storable_energy: Energy,
    /// Share of the content lost per hour
    #[serde(default)]
    pub loss_rate: f64,
    /// Losses per hour as a share of the nominal content
    #[serde(default)]
    pub fixed_losses_relative: f64,
    /// Absolute losses per hour
    #[serde(default)]
    pub fixed_losses_absolute: Power,
    /// Initial content relative to the nominal content (free if empty)
    pub initial_storage_level: Option<f64>,
    /// Minimum content relative to the nominal content
    #[serde(default)]
    pub min_storage_level: f64,
    /// Maximum content relative to the nominal content
    #[serde(default = "default_max_storage_level")]
    pub max_storage_level: f64,
    /// Charging efficiency
    pub efficiency_pump: Dimensionless,
    /// Discharging efficiency
    pub efficiency_turbine: Dimensionless,
    /// Variable cost of charging and discharging
    #[serde(default)]
    pub operation_cost: MoneyPerEnergy,
    /// Minimum turbine output relative to its capacity
    #[serde(default)]
    pub min_load_factor: f64,
    /// Maximum turbine output relative to its capacity
    #[serde(default = "default_max_load_factor")]
    pub max_load_factor: f64,
}
define_id_getter! {StorageRecord, ComponentID}

define_param_default!(default_max_storage_level, f64, 1.0);
define_param_default!(default_max_load_factor, f64, 1.0);

impl StorageRecord {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("capacity_pump", self.capacity_pump.0),
            ("capacity_turbine", self.capacity_turbine.0),
            ("nominal_storable_energy", self.nominal_storable_energy.0),
            ("fixed_losses_absolute", self.fixed_losses_absolute.0),
        ] {
            ensure_value!(
                value >= 0.0 && value.is_finite(),
                "{name} of storage {} must be non-negative",
                self.id
            );
        }
        for (name, value) in [
            ("loss_rate", Some(self.loss_rate)),
            ("fixed_losses_relative", Some(self.fixed_losses_relative)),
            ("initial_storage_level", self.initial_storage_level),
            ("min_storage_level", Some(self.min_storage_level)),
            ("max_storage_level", Some(self.max_storage_level)),
            ("min_load_factor", Some(self.min_load_factor)),
            ("max_load_factor", Some(self.max_load_factor)),
        ] {
            if let Some(value) = value {
                ensure_value!(
                    (0.0..=1.0).contains(&value),
                    "{name} of storage {} must be between 0 and 1",
                    self.id
                );
            }
        }
        for (name, value) in [
            ("efficiency_pump", self.efficiency_pump),
            ("efficiency_turbine", self.efficiency_turbine),
        ] {
            ensure_value!(
                value > Dimensionless(0.0) && value <= Dimensionless(1.0),
                "{name} of storage {} must be in (0, 1]",
                self.id
            );
        }
        ensure_value!(
            self.operation_cost.is_finite(),
            "Operation cost of storage {} must be finite",
            self.id
        );

        Ok(())
    }
}

/// Read storage units
pub fn read_storages(input_dir: &Path) -> Result<Vec<StorageRecord>> {
    let file_path = input_dir.join(STORAGES_FILE_NAME);
    let storages: Vec<StorageRecord> = read_csv_optional(&file_path)?.collect();
    read_storages_from_vec(storages).with_context(|| input_err_msg(&file_path))
}

fn read_storages_from_vec(storages: Vec<StorageRecord>) -> Result<Vec<StorageRecord>> {
    for storage in &storages {
        storage.validate()?;
    }
    if let Some(id) = find_duplicate_id(&storages) {
        bail!(DispatchError::InvalidValue(format!(
            "Duplicate storage ID found: {id}"
        )));
    }

    Ok(storages)
}
