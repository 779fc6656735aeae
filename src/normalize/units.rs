//! Unit systems and the fixed conversion table used to bring every sensor
//! column into the unit system the caller asked for.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The unit system of a normalized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UnitSystem {
    /// Celsius, hectopascal, m/s, millimetres, metres, kilometres.
    #[default]
    Metric,
    /// Fahrenheit, inches of mercury, mph, inches, feet, miles.
    Imperial,
}

impl UnitSystem {
    /// The value of the `units` request parameter.
    pub(crate) fn wire_value(&self) -> &'static str {
        match self {
            UnitSystem::Metric => "metric",
            UnitSystem::Imperial => "english",
        }
    }
}

impl fmt::Display for UnitSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown unit system '{0}' (expected metric, english or imperial)")]
pub struct UnknownUnitSystem(pub String);

impl FromStr for UnitSystem {
    type Err = UnknownUnitSystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "metric" => Ok(UnitSystem::Metric),
            "english" | "imperial" => Ok(UnitSystem::Imperial),
            _ => Err(UnknownUnitSystem(s.to_string())),
        }
    }
}

/// A physical unit as reported in the service's `UNITS` block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Unit {
    Celsius,
    Fahrenheit,
    Kelvin,
    Pascal,
    HectoPascal,
    KiloPascal,
    InchesOfMercury,
    MetersPerSecond,
    MilesPerHour,
    Knots,
    KilometersPerHour,
    Millimeters,
    Centimeters,
    Inches,
    Meters,
    Feet,
    Kilometers,
    Miles,
    Percent,
    Degrees,
    /// Anything without a conversion rule; values pass through untouched.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantity {
    Temperature,
    Pressure,
    Speed,
    /// Precipitation and snow depth scale lengths.
    ShortLength,
    /// Elevation and heights.
    Length,
    /// Visibility and distances.
    LongLength,
    Dimensionless,
}

impl Unit {
    /// Parses a unit label as the service writes it ("Celsius", "Pascals", "m/s", ...).
    pub fn parse(label: &str) -> Unit {
        match label.trim().to_ascii_lowercase().as_str() {
            "celsius" | "c" | "°c" | "degc" => Unit::Celsius,
            "fahrenheit" | "f" | "°f" | "degf" => Unit::Fahrenheit,
            "kelvin" | "k" => Unit::Kelvin,
            "pascals" | "pascal" | "pa" => Unit::Pascal,
            "millibars" | "millibar" | "mb" | "hpa" | "hectopascals" => Unit::HectoPascal,
            "kilopascals" | "kpa" => Unit::KiloPascal,
            "inhg" | "inches of mercury" => Unit::InchesOfMercury,
            "m/s" | "meters/second" | "mps" => Unit::MetersPerSecond,
            "miles/hour" | "mph" => Unit::MilesPerHour,
            "knots" | "kts" | "kt" => Unit::Knots,
            "km/h" | "kph" | "kilometers/hour" => Unit::KilometersPerHour,
            "millimeters" | "mm" => Unit::Millimeters,
            "centimeters" | "cm" => Unit::Centimeters,
            "inches" | "in" => Unit::Inches,
            "meters" | "m" => Unit::Meters,
            "feet" | "ft" => Unit::Feet,
            "kilometers" | "km" => Unit::Kilometers,
            "statute miles" | "miles" | "mi" => Unit::Miles,
            "%" | "percent" => Unit::Percent,
            "degrees" | "deg" => Unit::Degrees,
            _ => Unit::Other(label.to_string()),
        }
    }

    fn quantity(&self) -> Quantity {
        match self {
            Unit::Celsius | Unit::Fahrenheit | Unit::Kelvin => Quantity::Temperature,
            Unit::Pascal | Unit::HectoPascal | Unit::KiloPascal | Unit::InchesOfMercury => {
                Quantity::Pressure
            }
            Unit::MetersPerSecond
            | Unit::MilesPerHour
            | Unit::Knots
            | Unit::KilometersPerHour => Quantity::Speed,
            Unit::Millimeters | Unit::Centimeters | Unit::Inches => Quantity::ShortLength,
            Unit::Meters | Unit::Feet => Quantity::Length,
            Unit::Kilometers | Unit::Miles => Quantity::LongLength,
            Unit::Percent | Unit::Degrees | Unit::Other(_) => Quantity::Dimensionless,
        }
    }

    /// The unit this unit converts to under `system`.
    pub fn target(&self, system: UnitSystem) -> Unit {
        let metric = system == UnitSystem::Metric;
        match self.quantity() {
            Quantity::Temperature if metric => Unit::Celsius,
            Quantity::Temperature => Unit::Fahrenheit,
            Quantity::Pressure if metric => Unit::HectoPascal,
            Quantity::Pressure => Unit::InchesOfMercury,
            Quantity::Speed if metric => Unit::MetersPerSecond,
            Quantity::Speed => Unit::MilesPerHour,
            Quantity::ShortLength if metric => Unit::Millimeters,
            Quantity::ShortLength => Unit::Inches,
            Quantity::Length if metric => Unit::Meters,
            Quantity::Length => Unit::Feet,
            Quantity::LongLength if metric => Unit::Kilometers,
            Quantity::LongLength => Unit::Miles,
            Quantity::Dimensionless => self.clone(),
        }
    }

    /// Factor to the SI base of the quantity (temperature is handled separately).
    fn base_factor(&self) -> f64 {
        match self {
            Unit::Pascal => 1.0,
            Unit::HectoPascal => 100.0,
            Unit::KiloPascal => 1000.0,
            Unit::InchesOfMercury => 3386.389,
            Unit::MetersPerSecond => 1.0,
            Unit::MilesPerHour => 0.44704,
            Unit::Knots => 1852.0 / 3600.0,
            Unit::KilometersPerHour => 1.0 / 3.6,
            Unit::Millimeters => 0.001,
            Unit::Centimeters => 0.01,
            Unit::Inches => 0.0254,
            Unit::Meters => 1.0,
            Unit::Feet => 0.3048,
            Unit::Kilometers => 1000.0,
            Unit::Miles => 1609.344,
            _ => 1.0,
        }
    }

    fn to_celsius(&self, value: f64) -> f64 {
        match self {
            Unit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
            Unit::Kelvin => value - 273.15,
            _ => value,
        }
    }

    fn from_celsius(&self, value: f64) -> f64 {
        match self {
            Unit::Fahrenheit => value * 9.0 / 5.0 + 32.0,
            Unit::Kelvin => value + 273.15,
            _ => value,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Unit::Celsius => "Celsius",
            Unit::Fahrenheit => "Fahrenheit",
            Unit::Kelvin => "Kelvin",
            Unit::Pascal => "Pascals",
            Unit::HectoPascal => "hPa",
            Unit::KiloPascal => "kPa",
            Unit::InchesOfMercury => "inHg",
            Unit::MetersPerSecond => "m/s",
            Unit::MilesPerHour => "mph",
            Unit::Knots => "knots",
            Unit::KilometersPerHour => "km/h",
            Unit::Millimeters => "Millimeters",
            Unit::Centimeters => "Centimeters",
            Unit::Inches => "Inches",
            Unit::Meters => "Meters",
            Unit::Feet => "ft",
            Unit::Kilometers => "km",
            Unit::Miles => "Statute miles",
            Unit::Percent => "%",
            Unit::Degrees => "Degrees",
            Unit::Other(label) => label.as_str(),
        };
        write!(f, "{}", label)
    }
}

/// Converts a single value between two units of the same quantity.
///
/// Identical units return the value untouched, so converting data that is
/// already in the requested system is a no-op. Units of different quantities
/// are never converted into each other.
///
/// # Examples
///
/// ```
/// use synoptic::{convert, Unit};
///
/// assert_eq!(convert(100.0, &Unit::Celsius, &Unit::Fahrenheit), 212.0);
/// assert_eq!(convert(101325.0, &Unit::Pascal, &Unit::HectoPascal), 1013.25);
/// assert_eq!(convert(12.5, &Unit::Celsius, &Unit::Celsius), 12.5);
/// ```
pub fn convert(value: f64, from: &Unit, to: &Unit) -> f64 {
    if from == to || from.quantity() != to.quantity() {
        return value;
    }
    match from.quantity() {
        Quantity::Temperature => to.from_celsius(from.to_celsius(value)),
        Quantity::Dimensionless => value,
        _ => value * from.base_factor() / to.base_factor(),
    }
}

/// Converts a whole column in place into `system` and returns the resulting unit.
pub(crate) fn convert_column(values: &mut [f64], from: &Unit, system: UnitSystem) -> Unit {
    let target = from.target(system);
    if &target != from {
        for value in values.iter_mut() {
            *value = convert(*value, from, &target);
        }
    }
    target
}
