//! Quantities computed from normalized columns.

use crate::error::MissingColumnError;
use crate::types::station::StationRecord;
use crate::types::table::TimeTable;
use crate::normalize::variables::SensorKey;
use log::warn;

pub const WIND_SPEED: &str = "wind_speed";
pub const WIND_DIRECTION: &str = "wind_direction";
pub const WIND_U: &str = "wind_u";
pub const WIND_V: &str = "wind_v";

fn round3(value: f64) -> f64 {
    // Adding zero turns a rounded -0.0 into 0.0.
    (value * 1000.0).round() / 1000.0 + 0.0
}

/// Converts a wind speed and the direction it blows from (degrees clockwise from
/// north) into eastward (`u`) and northward (`v`) components, rounded to 3 decimals.
///
/// # Examples
///
/// ```
/// use synoptic::spddir_to_uv;
///
/// assert_eq!(spddir_to_uv(10.0, 270.0), (10.0, 0.0)); // from the west, blowing east
/// assert_eq!(spddir_to_uv(5.0, 0.0), (0.0, -5.0)); // from the north, blowing south
/// assert_eq!(spddir_to_uv(0.0, 123.0), (0.0, 0.0));
/// ```
pub fn spddir_to_uv(speed: f64, direction: f64) -> (f64, f64) {
    if speed == 0.0 {
        return (0.0, 0.0);
    }
    if speed.is_nan() || direction.is_nan() {
        return (f64::NAN, f64::NAN);
    }
    let radians = direction.to_radians();
    (
        round3(-speed * radians.sin()),
        round3(-speed * radians.cos()),
    )
}

/// Computes `(u, v)` from the table's `wind_speed` and `wind_direction` columns.
///
/// The result is aligned to the table's index; a row missing either input is
/// missing in both outputs. The table is not modified.
///
/// # Errors
///
/// Returns [`MissingColumnError`] naming the first absent input column.
pub fn wind_vector_components(table: &TimeTable) -> Result<(Vec<f64>, Vec<f64>), MissingColumnError> {
    components_from(table, WIND_SPEED, WIND_DIRECTION)
}

fn components_from(
    table: &TimeTable,
    speed_column: &str,
    direction_column: &str,
) -> Result<(Vec<f64>, Vec<f64>), MissingColumnError> {
    let missing = |column: &str| MissingColumnError {
        column: column.to_string(),
        station: None,
    };
    let speed = table
        .column(speed_column)
        .ok_or_else(|| missing(speed_column))?;
    let direction = table
        .column(direction_column)
        .ok_or_else(|| missing(direction_column))?;
    Ok(speed
        .iter()
        .zip(direction)
        .map(|(s, d)| spddir_to_uv(*s, *d))
        .unzip())
}

/// Speed/direction column pairs of a table, with the names their components get.
///
/// Besides the canonical pair, secondary sensor variants that exist for both
/// inputs (`wind_speed_set_2` with `wind_direction_set_2`) are paired as well.
pub(crate) fn wind_pairs(table: &TimeTable) -> Vec<(String, String, String, String)> {
    let mut pairs = Vec::new();
    if table.column(WIND_SPEED).is_some() && table.column(WIND_DIRECTION).is_some() {
        pairs.push((
            WIND_SPEED.to_string(),
            WIND_DIRECTION.to_string(),
            WIND_U.to_string(),
            WIND_V.to_string(),
        ));
    }
    for column in table.column_names() {
        let key = SensorKey::parse(column);
        if key.variable != WIND_SPEED || key.variant.is_none() {
            continue;
        }
        let suffix = &column[WIND_SPEED.len()..];
        let direction = format!("{}{}", WIND_DIRECTION, suffix);
        if table.column(&direction).is_some() {
            pairs.push((
                column.to_string(),
                direction,
                format!("{}{}", WIND_U, suffix),
                format!("{}{}", WIND_V, suffix),
            ));
        }
    }
    pairs
}

/// Appends `wind_u`/`wind_v` columns to a station record, in the unit of its wind speed.
///
/// Returns the number of component pairs added. A `wind_u`/`wind_v` column already in
/// the table is replaced, with a warning.
///
/// # Errors
///
/// Returns [`MissingColumnError`] if the record has no `wind_speed`/`wind_direction` pair at all.
pub fn append_wind_components(record: &mut StationRecord) -> Result<usize, MissingColumnError> {
    let pairs = wind_pairs(&record.table);
    if pairs.is_empty() {
        let column = if record.table.column(WIND_SPEED).is_none() {
            WIND_SPEED
        } else {
            WIND_DIRECTION
        };
        return Err(MissingColumnError {
            column: column.to_string(),
            station: Some(record.id.clone()),
        });
    }

    for (speed, direction, u_name, v_name) in &pairs {
        let (u, v) = components_from(&record.table, speed, direction).map_err(|mut e| {
            e.station = Some(record.id.clone());
            e
        })?;
        let mut added = true;
        for (name, values) in [(u_name, u), (v_name, v)] {
            match record.table.insert_column(name.clone(), values) {
                Ok(Some(_)) => warn!(
                    "Station {} already had a '{}' column, replacing it with the derived one",
                    record.id, name
                ),
                Ok(None) => {}
                Err(e) => {
                    warn!("Cannot add '{}' to station {}: {}", name, record.id, e);
                    added = false;
                }
            }
        }
        if !added {
            continue;
        }
        if let Some(unit) = record.units.get(speed).cloned() {
            record.units.insert(u_name.clone(), unit.clone());
            record.units.insert(v_name.clone(), unit);
        }
    }
    Ok(pairs.len())
}
