//! Code for reading conversion units: conventional power plants and interconnectors.
use super::{
    check_normalised, ensure_value, input_err_msg, lookup_profile, read_csv_optional,
    read_time_series_optional,
};
use crate::bus::BusID;
use crate::error::DispatchError;
use crate::id::{ComponentID, define_id_getter, find_duplicate_id};
use crate::time::TimeIndex;
use crate::units::{Dimensionless, MoneyPerEnergy, Power, UnitType};
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const TRANSFORMERS_FILE_NAME: &str = "transformers.csv";
const MIN_LOADS_TS_FILE_NAME: &str = "min_loads_ts.csv";
const AVAILABILITY_TS_FILE_NAME: &str = "availability_ts.csv";
const INTERCONNECTORS_FILE_NAME: &str = "interconnectors.csv";
const INTERCONNECTORS_TS_FILE_NAME: &str = "interconnectors_ts.csv";

/// The kind of power plant
#[derive(Debug, Clone, Copy, PartialEq, Eq, DeserializeLabeledStringEnum)]
pub enum TransformerKind {
    /// A plant producing electricity only
    #[string = "condensing"]
    Condensing,
    /// A combined heat and power plant
    #[string = "chp"]
    Chp,
    /// An industrial power plant
    #[string = "ipp"]
    Ipp,
}

/// A dispatchable power plant converting fuel into electricity (and optionally heat)
#[derive(Debug, Clone, PartialEq)]
pub struct TransformerRecord {
    /// Unique identifier
    pub id: ComponentID,
    /// The bidding zone of the plant
    pub country: String,
    /// The kind of plant
    pub kind: TransformerKind,
    /// The fuel bus the plant draws from
    pub from: BusID,
    /// The electricity bus supplied
    pub to_el: BusID,
    /// The heat bus supplied, for CHP plants
    pub to_th: Option<BusID>,
    /// Net electrical capacity
    pub capacity: Power,
    /// Electrical efficiency
    pub efficiency_el: Dimensionless,
    /// Thermal efficiency, for CHP plants
    pub efficiency_th: Option<Dimensionless>,
    /// Variable operation cost per unit of electricity
    pub operation_cost: MoneyPerEnergy,
    /// Normalised minimum output for every time step
    pub min_load: Vec<f64>,
    /// Maximum output as a fraction of capacity
    pub max_load_factor: f64,
    /// Normalised availability for every time step
    pub availability: Vec<f64>,
    /// Maximum increase in output per time step as a fraction of capacity
    pub grad_pos: Option<f64>,
    /// Maximum decrease in output per time step as a fraction of capacity
    pub grad_neg: Option<f64>,
}
define_id_getter! {TransformerRecord, ComponentID}

#[derive(Debug, Deserialize)]
struct TransformerRaw {
    id: ComponentID,
    country: String,
    from: BusID,
    to_el: BusID,
    to_th: Option<BusID>,
    kind: TransformerKind,
    capacity: Power,
    efficiency_el: Dimensionless,
    efficiency_th: Option<Dimensionless>,
    operation_cost: MoneyPerEnergy,
    min_load_factor: Option<f64>,
    max_load_factor: Option<f64>,
    grad_pos: Option<f64>,
    grad_neg: Option<f64>,
    min_load_profile: Option<String>,
}

fn is_efficiency(value: Dimensionless) -> bool {
    value > Dimensionless(0.0) && value <= Dimensionless(1.0)
}

impl TransformerRaw {
    fn validate(&self) -> Result<()> {
        ensure_value!(
            self.capacity >= Power(0.0) && self.capacity.is_finite(),
            "Capacity of {} must be non-negative",
            self.id
        );
        ensure_value!(
            is_efficiency(self.efficiency_el),
            "Electrical efficiency of {} must be in (0, 1]",
            self.id
        );
        if let Some(efficiency_th) = self.efficiency_th {
            ensure_value!(
                is_efficiency(efficiency_th),
                "Thermal efficiency of {} must be in (0, 1]",
                self.id
            );
        }
        ensure_value!(
            self.to_th.is_some() == self.efficiency_th.is_some(),
            "Heat output and thermal efficiency of {} must be given together",
            self.id
        );
        ensure_value!(
            self.operation_cost.is_finite(),
            "Operation cost of {} must be finite",
            self.id
        );
        for (name, value) in [
            ("min_load_factor", self.min_load_factor),
            ("max_load_factor", self.max_load_factor),
            ("grad_pos", self.grad_pos),
            ("grad_neg", self.grad_neg),
        ] {
            if let Some(value) = value {
                ensure_value!(
                    (0.0..=1.0).contains(&value),
                    "{name} of {} must be between 0 and 1",
                    self.id
                );
            }
        }

        Ok(())
    }
}

/// Read power plants with their minimum load profiles and availability
pub fn read_transformers(
    input_dir: &Path,
    time_index: &TimeIndex,
) -> Result<Vec<TransformerRecord>> {
    let file_path = input_dir.join(TRANSFORMERS_FILE_NAME);
    let transformers_raw: Vec<TransformerRaw> = read_csv_optional(&file_path)?.collect();
    if transformers_raw.is_empty() {
        return Ok(Vec::new());
    }

    let min_loads =
        read_time_series_optional(&input_dir.join(MIN_LOADS_TS_FILE_NAME), time_index)?;
    let availability_path = input_dir.join(AVAILABILITY_TS_FILE_NAME);
    let availability = match read_time_series_optional(&availability_path, time_index)? {
        Some(table) => {
            let values = table
                .column("availability")
                .with_context(|| input_err_msg(&availability_path))?
                .to_vec();
            check_normalised(&values, "Availability")
                .with_context(|| input_err_msg(&availability_path))?;
            values
        }
        None => vec![1.0; time_index.len()],
    };

    let transformers = transformers_raw
        .into_iter()
        .map(|raw| -> Result<_> {
            raw.validate()?;
            let min_load = match &raw.min_load_profile {
                Some(profile) => {
                    let values =
                        lookup_profile(min_loads.as_ref(), profile, MIN_LOADS_TS_FILE_NAME)?;
                    check_normalised(&values, &format!("Minimum load profile {profile}"))?;
                    values
                }
                None => vec![raw.min_load_factor.unwrap_or(0.0); time_index.len()],
            };

            Ok(TransformerRecord {
                id: raw.id,
                country: raw.country,
                kind: raw.kind,
                from: raw.from,
                to_el: raw.to_el,
                to_th: raw.to_th,
                capacity: raw.capacity,
                efficiency_el: raw.efficiency_el,
                efficiency_th: raw.efficiency_th,
                operation_cost: raw.operation_cost,
                min_load,
                max_load_factor: raw.max_load_factor.unwrap_or(1.0),
                availability: availability.clone(),
                grad_pos: raw.grad_pos,
                grad_neg: raw.grad_neg,
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    if let Some(id) = find_duplicate_id(&transformers) {
        bail!(DispatchError::InvalidValue(format!(
            "Duplicate transformer ID found: {id}"
        )));
    }

    Ok(transformers)
}

/// A directed link between two electricity buses
#[derive(Debug, Clone, PartialEq)]
pub struct Interconnector {
    /// Unique identifier
    pub id: ComponentID,
    /// The exporting bus
    pub from: BusID,
    /// The importing bus
    pub to: BusID,
    /// Net transfer capacity
    pub capacity: Power,
    /// Share of the exported energy which arrives
    pub conversion_factor: Dimensionless,
    /// Normalised available transfer capacity for every time step
    pub profile: Vec<f64>,
}
define_id_getter! {Interconnector, ComponentID}

#[derive(Debug, Deserialize)]
struct InterconnectorRaw {
    id: ComponentID,
    from: BusID,
    to: BusID,
    capacity: Power,
    conversion_factor: Dimensionless,
    profile: Option<String>,
}

impl InterconnectorRaw {
    fn validate(&self) -> Result<()> {
        ensure_value!(
            self.capacity >= Power(0.0) && self.capacity.is_finite(),
            "Capacity of interconnector {} must be non-negative",
            self.id
        );
        ensure_value!(
            is_efficiency(self.conversion_factor),
            "Conversion factor of interconnector {} must be in (0, 1]",
            self.id
        );
        ensure_value!(
            self.from != self.to,
            "Interconnector {} must connect two different buses",
            self.id
        );

        Ok(())
    }
}

/// Read interconnectors and their transfer capacity profiles
pub fn read_interconnectors(
    input_dir: &Path,
    time_index: &TimeIndex,
) -> Result<Vec<Interconnector>> {
    let file_path = input_dir.join(INTERCONNECTORS_FILE_NAME);
    let interconnectors_raw: Vec<InterconnectorRaw> = read_csv_optional(&file_path)?.collect();
    if interconnectors_raw.is_empty() {
        return Ok(Vec::new());
    }

    let profiles =
        read_time_series_optional(&input_dir.join(INTERCONNECTORS_TS_FILE_NAME), time_index)?;
    let interconnectors = interconnectors_raw
        .into_iter()
        .map(|raw| -> Result<_> {
            raw.validate()?;
            let profile = match &raw.profile {
                Some(profile) => {
                    let values =
                        lookup_profile(profiles.as_ref(), profile, INTERCONNECTORS_TS_FILE_NAME)?;
                    check_normalised(&values, &format!("Transfer capacity profile {profile}"))?;
                    values
                }
                None => vec![1.0; time_index.len()],
            };

            Ok(Interconnector {
                id: raw.id,
                from: raw.from,
                to: raw.to,
                capacity: raw.capacity,
                conversion_factor: raw.conversion_factor,
                profile,
            })
        })
        .collect::<Result<Vec<_>>>()
        .with_context(|| input_err_msg(&file_path))?;

    if let Some(id) = find_duplicate_id(&interconnectors) {
        bail!(DispatchError::InvalidValue(format!(
            "Duplicate interconnector ID found: {id}"
        )));
    }

    Ok(interconnectors)
}
