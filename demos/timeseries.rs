//! Fetches a day of KSLC observations and prints them as a polars frame.
//!
//! Run with `SYNOPTIC_API_KEY=... cargo run --example timeseries`.

use chrono::{TimeZone, Utc};
use std::env;
use synoptic::{QuerySpec, Synoptic, SynopticError, TimezonePreference};

#[tokio::main]
async fn main() -> Result<(), SynopticError> {
    configure_polars_display();
    let client = Synoptic::from_env()?;

    let spec = QuerySpec::builder()
        .stid("KSLC")
        .vars(["air_temp", "wind_speed", "wind_direction"])
        .start(Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap())
        .end(Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap())
        .obtimezone(TimezonePreference::Local)
        .build();

    let set = client.stations_timeseries().spec(&spec).call().await?;
    for warning in &set.warnings {
        eprintln!("warning: {}", warning);
    }
    for station in &set {
        let frame = station.table.to_dataframe().map_err(|source| SynopticError::Frame {
            station: station.id.clone(),
            source,
        })?;
        println!("{} ({:?})", station.id, station.name);
        println!("{}", frame);
    }

    client.disable_token().await;
    Ok(())
}

fn configure_polars_display() {
    // show every column
    env::set_var("POLARS_FMT_MAX_COLS", "-1");
    // show 30 rows
    env::set_var("POLARS_FMT_MAX_ROWS", "30");
}
