//! Sensor variable names and variant resolution.
//!
//! The service reports a variable once per sensor and derivation, e.g.
//! `air_temp_set_1`, `air_temp_set_2` and `dew_point_temperature_set_1d`
//! (time series) or `air_temp_value_1` (latest / nearest time). Column names are
//! parsed once into a [`SensorKey`]; resolution then works on the tagged form.

use log::warn;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which reading of a variable a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SensorVariant {
    /// Measured by sensor N.
    Raw(u32),
    /// Derived or interpolated by the service from sensor N.
    Derived(u32),
}

impl SensorVariant {
    pub fn index(&self) -> u32 {
        match self {
            SensorVariant::Raw(i) | SensorVariant::Derived(i) => *i,
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, SensorVariant::Derived(_))
    }
}

/// A column name split into its logical variable and variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SensorKey {
    /// The full name as reported, e.g. `air_temp_set_1d`.
    pub column: String,
    /// The logical variable, e.g. `air_temp`.
    pub variable: String,
    /// `None` for names without a set/value suffix.
    pub variant: Option<SensorVariant>,
}

impl SensorKey {
    /// Parses a reported column name.
    ///
    /// # Examples
    ///
    /// ```
    /// use synoptic::{SensorKey, SensorVariant};
    ///
    /// let key = SensorKey::parse("dew_point_temperature_set_1d");
    /// assert_eq!(key.variable, "dew_point_temperature");
    /// assert_eq!(key.variant, Some(SensorVariant::Derived(1)));
    ///
    /// let plain = SensorKey::parse("wind_u");
    /// assert_eq!(plain.variable, "wind_u");
    /// assert_eq!(plain.variant, None);
    /// ```
    pub fn parse(column: &str) -> SensorKey {
        for marker in ["_set_", "_value_"] {
            let Some(pos) = column.rfind(marker) else {
                continue;
            };
            let (variable, suffix) = (&column[..pos], &column[pos + marker.len()..]);
            if variable.is_empty() {
                continue;
            }
            if let Some(variant) = parse_variant(suffix) {
                return SensorKey {
                    column: column.to_string(),
                    variable: variable.to_string(),
                    variant: Some(variant),
                };
            }
        }
        SensorKey {
            column: column.to_string(),
            variable: column.to_string(),
            variant: None,
        }
    }
}

fn parse_variant(suffix: &str) -> Option<SensorVariant> {
    let (digits, derived) = match suffix.strip_suffix('d') {
        Some(digits) => (digits, true),
        None => (suffix, false),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let index: u32 = digits.parse().ok()?;
    Some(if derived {
        SensorVariant::Derived(index)
    } else {
        SensorVariant::Raw(index)
    })
}

/// Precedence among the variants of one logical variable.
///
/// A variant named explicitly in the query's `vars` always wins. Remaining ties are
/// broken by lower sensor index and then by column name, so resolution is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VariantPolicy {
    /// Raw before derived, then lowest sensor index.
    #[default]
    RawFirst,
    /// Derived before raw, then lowest sensor index.
    DerivedFirst,
    /// The variant with the most non-missing readings; ties fall back to `RawFirst`.
    MostObservations,
}

impl fmt::Display for VariantPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariantPolicy::RawFirst => write!(f, "raw-first"),
            VariantPolicy::DerivedFirst => write!(f, "derived-first"),
            VariantPolicy::MostObservations => write!(f, "most-observations"),
        }
    }
}

/// Inputs of a resolution run.
pub(crate) struct Resolution<'a> {
    pub policy: VariantPolicy,
    /// Column names the caller asked for explicitly (with suffix).
    pub explicit: &'a BTreeSet<String>,
    /// Whether the preferred variant gets the bare variable name.
    pub rename_sets: bool,
    /// Caller renames applied to canonical names.
    pub rename: &'a BTreeMap<String, String>,
}

impl Resolution<'_> {
    /// Maps every reported column to its canonical name.
    ///
    /// `observations` gives the number of non-missing readings of a column.
    pub fn resolve(
        &self,
        columns: &[String],
        observations: impl Fn(&str) -> usize,
    ) -> BTreeMap<String, String> {
        let mut groups: BTreeMap<String, Vec<SensorKey>> = BTreeMap::new();
        for column in columns {
            let key = SensorKey::parse(column);
            groups.entry(key.variable.clone()).or_default().push(key);
        }

        let mut canonical: BTreeMap<String, String> = BTreeMap::new();
        for (variable, mut keys) in groups {
            keys.sort_by_key(|key| {
                let variant = key.variant;
                let explicit = !self.explicit.contains(&key.column);
                let suffixed = variant.is_some();
                let derived = variant.map(|v| v.is_derived()).unwrap_or(false);
                let index = variant.map(|v| v.index()).unwrap_or(0);
                let count = match self.policy {
                    VariantPolicy::MostObservations => Reverse(observations(&key.column)),
                    _ => Reverse(0),
                };
                let derived_rank = match self.policy {
                    VariantPolicy::DerivedFirst => !derived,
                    _ => derived,
                };
                (suffixed, explicit, count, derived_rank, index, key.column.clone())
            });
            for (position, key) in keys.iter().enumerate() {
                let name = if position == 0 && (self.rename_sets || key.variant.is_none()) {
                    variable.clone()
                } else {
                    key.column.clone()
                };
                canonical.insert(key.column.clone(), name);
            }
        }

        self.apply_renames(canonical)
    }

    fn apply_renames(&self, mut canonical: BTreeMap<String, String>) -> BTreeMap<String, String> {
        if self.rename.is_empty() {
            return canonical;
        }
        // Holds both the original names and every target assigned so far.
        let mut taken: BTreeSet<String> = canonical.values().cloned().collect();
        for name in canonical.values_mut() {
            let Some(target) = self.rename.get(name.as_str()) else {
                continue;
            };
            if target.as_str() != name.as_str() && taken.contains(target) {
                warn!(
                    "Not renaming column '{}' to '{}': a column with that name exists",
                    name, target
                );
                continue;
            }
            taken.insert(target.clone());
            *name = target.clone();
        }
        canonical
    }
}

/// Column names the caller asked for with an explicit variant suffix.
pub(crate) fn explicit_variants<'a>(vars: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    vars.filter(|var| SensorKey::parse(var).variant.is_some())
        .map(str::to_string)
        .collect()
}
