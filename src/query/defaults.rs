//! The single table of query option defaults.
//!
//! `QuerySpec`'s builder takes its defaults from the constants below, so an
//! omitted option is filled in once, at construction, and never re-derived later.

use crate::normalize::timezone::TimezonePreference;
use crate::normalize::units::UnitSystem;
use crate::normalize::variables::VariantPolicy;
use crate::query::spec::VarsOperator;

pub const UNITS: UnitSystem = UnitSystem::Metric;
pub const OBTIMEZONE: TimezonePreference = TimezonePreference::Utc;
/// Look-back window in minutes for `latest` and `nearesttime`.
pub const WITHIN_MINUTES: u32 = 60;
pub const VARS_OPERATOR: VarsOperator = VarsOperator::Or;
pub const VARIANT_POLICY: VariantPolicy = VariantPolicy::RawFirst;
pub const RENAME_SETS: bool = true;
pub const DERIVE_WIND: bool = true;

/// Documented `{option: default}` table, in the form the options are written on the wire.
pub const OPTION_DEFAULTS: &[(&str, &str)] = &[
    ("units", "metric"),
    ("obtimezone", "utc"),
    ("within", "60"),
    ("varsoperator", "or"),
    ("variant", "raw-first"),
    ("rename_sets", "true"),
    ("derive_wind", "true"),
];

/// Looks up the documented default of an option.
pub fn default_for(option: &str) -> Option<&'static str> {
    OPTION_DEFAULTS
        .iter()
        .find(|(name, _)| *name == option)
        .map(|(_, value)| *value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_constants() {
        assert_eq!(default_for("units"), Some(UNITS.wire_value()));
        assert_eq!(default_for("obtimezone"), Some(OBTIMEZONE.to_string().as_str()));
        assert_eq!(default_for("within"), Some(WITHIN_MINUTES.to_string().as_str()));
        assert_eq!(default_for("varsoperator"), Some(VARS_OPERATOR.wire_value()));
        assert_eq!(default_for("variant"), Some(VARIANT_POLICY.to_string().as_str()));
        assert_eq!(default_for("rename_sets"), Some(RENAME_SETS.to_string().as_str()));
        assert_eq!(default_for("derive_wind"), Some(DERIVE_WIND.to_string().as_str()));
        assert_eq!(default_for("bogus"), None);
    }
}
