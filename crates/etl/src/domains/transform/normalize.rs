use time::{Date, OffsetDateTime};

use super::ValidatedBatch;
use crate::Location;

/// One hourly observation in the warehouse schema.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub timestamp: OffsetDateTime,
    pub temperature_c: f64,
    pub relative_humidity_pct: f64,
    pub precipitation_mm: f64,
    /// `None` only for rows loaded before locations were tracked
    pub location_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub load_date: Date,
}

/// One row per hour in source order, each stamped with the location and load date.
pub fn normalize(batch: ValidatedBatch, location: &Location, load_date: Date) -> Vec<NormalizedRow> {
    let ValidatedBatch {
        timestamps,
        temperature_2m,
        relativehumidity_2m,
        precipitation,
    } = batch;

    timestamps
        .into_iter()
        .zip(temperature_2m)
        .zip(relativehumidity_2m)
        .zip(precipitation)
        .map(
            |(((timestamp, temperature_c), relative_humidity_pct), precipitation_mm)| {
                NormalizedRow {
                    timestamp,
                    temperature_c,
                    relative_humidity_pct,
                    precipitation_mm,
                    location_name: Some(location.name.clone()),
                    latitude: location.latitude,
                    longitude: location.longitude,
                    load_date,
                }
            },
        )
        .collect()
}
