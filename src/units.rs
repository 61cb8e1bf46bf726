//! Unit types for the physical and economic quantities used by the model.
//!
//! Each unit is a thin wrapper around an `f64`. Only the arithmetic which makes sense for a given
//! pair of units is implemented, so e.g. multiplying a [`Power`] by [`Hours`] gives an [`Energy`].
use float_cmp::{ApproxEq, F64Margin};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Div, Mul};

/// A trait encompassing most of the functionality of unit types
pub trait UnitType:
    fmt::Debug
    + Copy
    + PartialEq
    + PartialOrd
    + Serialize
    + std::ops::Add<Output = Self>
    + std::ops::Sub<Output = Self>
    + Mul<Dimensionless, Output = Self>
    + Div<Dimensionless, Output = Self>
    + std::iter::Sum
    + Default
{
    /// Create from an f64 value
    fn new(value: f64) -> Self;
    /// Returns the underlying f64 value
    fn value(&self) -> f64;
    /// Returns true if the value is neither infinite nor NaN
    fn is_finite(&self) -> bool;
}

/// A dimensionless quantity, e.g. an efficiency or a normalised load factor
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    PartialOrd,
    Serialize,
    Deserialize,
    Default,
    derive_more::Add,
    derive_more::Sub,
    derive_more::AddAssign,
    derive_more::SubAssign,
    derive_more::Sum,
    derive_more::Neg,
)]
pub struct Dimensionless(pub f64);

impl Mul for Dimensionless {
    type Output = Dimensionless;

    fn mul(self, rhs: Dimensionless) -> Dimensionless {
        Dimensionless(self.0 * rhs.0)
    }
}

impl Div for Dimensionless {
    type Output = Dimensionless;

    fn div(self, rhs: Dimensionless) -> Dimensionless {
        Dimensionless(self.0 / rhs.0)
    }
}

impl fmt::Display for Dimensionless {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ApproxEq for Dimensionless {
    type Margin = F64Margin;

    fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
        self.0.approx_eq(other.0, margin)
    }
}

impl UnitType for Dimensionless {
    fn new(value: f64) -> Self {
        Dimensionless(value)
    }

    fn value(&self) -> f64 {
        self.0
    }

    fn is_finite(&self) -> bool {
        self.0.is_finite()
    }
}

macro_rules! base_unit_struct {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            PartialOrd,
            Serialize,
            Deserialize,
            Default,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::Neg,
        )]
        pub struct $name(pub f64);

        impl Mul<Dimensionless> for $name {
            type Output = $name;

            fn mul(self, rhs: Dimensionless) -> $name {
                $name(self.0 * rhs.0)
            }
        }

        impl Div<Dimensionless> for $name {
            type Output = $name;

            fn div(self, rhs: Dimensionless) -> $name {
                $name(self.0 / rhs.0)
            }
        }

        impl Div<$name> for $name {
            type Output = Dimensionless;

            fn div(self, rhs: $name) -> Dimensionless {
                Dimensionless(self.0 / rhs.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ApproxEq for $name {
            type Margin = F64Margin;

            fn approx_eq<M: Into<Self::Margin>>(self, other: Self, margin: M) -> bool {
                self.0.approx_eq(other.0, margin)
            }
        }

        impl UnitType for $name {
            fn new(value: f64) -> Self {
                $name(value)
            }

            fn value(&self) -> f64 {
                self.0
            }

            fn is_finite(&self) -> bool {
                self.0.is_finite()
            }
        }
    };
}

base_unit_struct!(Hours, "A length of time in hours");
base_unit_struct!(Power, "Electrical or thermal power (MW)");
base_unit_struct!(Energy, "An amount of energy (MWh)");
base_unit_struct!(Money, "An amount of money (EUR)");
base_unit_struct!(MoneyPerEnergy, "A price or cost per unit of energy (EUR/MWh)");
base_unit_struct!(Emissions, "Emitted CO2 (t)");
base_unit_struct!(EmissionsPerEnergy, "An emission factor (t/MWh)");
base_unit_struct!(MoneyPerEmissions, "A CO2 price (EUR/t)");

/// Implement `Lhs * Rhs = Out` in both orders
macro_rules! impl_mul {
    ($lhs:ident, $rhs:ident, $out:ident) => {
        impl Mul<$rhs> for $lhs {
            type Output = $out;

            fn mul(self, rhs: $rhs) -> $out {
                $out(self.0 * rhs.0)
            }
        }

        impl Mul<$lhs> for $rhs {
            type Output = $out;

            fn mul(self, rhs: $lhs) -> $out {
                $out(self.0 * rhs.0)
            }
        }
    };
}

/// Implement `Lhs / Rhs = Out`
macro_rules! impl_div {
    ($lhs:ident, $rhs:ident, $out:ident) => {
        impl Div<$rhs> for $lhs {
            type Output = $out;

            fn div(self, rhs: $rhs) -> $out {
                $out(self.0 / rhs.0)
            }
        }
    };
}

impl_mul!(Power, Hours, Energy);
impl_mul!(Energy, MoneyPerEnergy, Money);
impl_mul!(Energy, EmissionsPerEnergy, Emissions);
impl_mul!(EmissionsPerEnergy, MoneyPerEmissions, MoneyPerEnergy);
impl_div!(Energy, Hours, Power);
impl_div!(Money, Energy, MoneyPerEnergy);
impl_div!(Emissions, Energy, EmissionsPerEnergy);

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;

    #[test]
    fn power_times_hours() {
        assert_eq!(Power(60.0) * Hours(0.25), Energy(15.0));
        assert_eq!(Hours(2.0) * Power(10.0), Energy(20.0));
    }

    #[test]
    fn fuel_cost_including_emissions() {
        let cost = EmissionsPerEnergy(0.2) * MoneyPerEmissions(25.0);
        assert_approx_eq!(MoneyPerEnergy, cost, MoneyPerEnergy(5.0));
    }

    #[test]
    fn unit_ratio_is_dimensionless() {
        assert_eq!(Energy(30.0) / Energy(60.0), Dimensionless(0.5));
        assert_eq!(Energy(30.0) / Hours(3.0), Power(10.0));
    }

    #[test]
    fn sum_of_units() {
        let total: Money = [Money(1.0), Money(2.5)].into_iter().sum();
        assert_eq!(total, Money(3.5));
    }
}
