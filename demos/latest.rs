//! Latest temperature and wind within 10 miles of downtown Salt Lake City, nearest station first.

use synoptic::{LatLon, QuerySpec, Radius, Synoptic, SynopticError, UnitSystem};

#[tokio::main]
async fn main() -> Result<(), SynopticError> {
    let client = Synoptic::from_env()?;

    let spec = QuerySpec::builder()
        .radius(Radius::around_point(LatLon(40.7608, -111.8910), 10.0))
        .vars(["air_temp", "wind_speed", "wind_direction"])
        .within(30)
        .units(UnitSystem::Imperial)
        .build();

    let set = client.stations_latest().spec(&spec).call().await?;
    println!("{} stations reported in the last 30 minutes", set.len());
    for station in &set {
        let last = |column: &str| {
            station
                .table
                .column(column)
                .and_then(|values| values.iter().rev().find(|v| !v.is_nan()).copied())
        };
        println!(
            "{:>8} {:>6.1} mi  temp {:?} {}  wind u/v {:?}/{:?}",
            station.id,
            station.distance_miles.unwrap_or(f64::NAN),
            last("air_temp"),
            station
                .unit_of("air_temp")
                .map(|u| u.to_string())
                .unwrap_or_default(),
            last("wind_u"),
            last("wind_v"),
        );
    }
    Ok(())
}
