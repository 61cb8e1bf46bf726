//! Buses are balancing nodes enforcing energy conservation for one zone and carrier.
use crate::id::{define_id_getter, define_id_type};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;

define_id_type! {BusID}

/// A map of [`Bus`]es, keyed by bus ID
pub type BusMap = IndexMap<BusID, Bus>;

/// A zero-dimensional balancing node
#[derive(PartialEq, Debug, Deserialize, Clone)]
pub struct Bus {
    /// Unique identifier for the bus (e.g. "DE_bus_el")
    pub id: BusID,
    /// The bidding zone the bus belongs to (e.g. "DE")
    pub country: String,
    /// What kind of energy is balanced at this bus
    pub carrier: Carrier,
}
define_id_getter! {Bus, BusID}

impl Bus {
    /// Whether a day-ahead price is reported for this bus
    pub fn is_electricity(&self) -> bool {
        self.carrier == Carrier::Electricity
    }
}

/// The energy carrier balanced at a bus
#[derive(PartialEq, Eq, Clone, Copy, Debug, DeserializeLabeledStringEnum)]
pub enum Carrier {
    /// Electricity (one bus per bidding zone)
    #[string = "electricity"]
    Electricity,
    /// Heat from combined heat and power plants
    #[string = "heat"]
    Heat,
    /// A fuel (e.g. natural gas) supplied by commodity sources
    #[string = "fuel"]
    Fuel,
}
