use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Value};
use slog::{o, Discard, Logger};
use std::sync::Arc;
use tempfile::TempDir;
use time::{macros::datetime, macros::format_description, Duration, OffsetDateTime};
use weather_etl::{extract, ForecastSource, Location, Pipeline, PipelineSettings, Warehouse};

/// Processing instant used by the pipeline tests.
pub const NOW: OffsetDateTime = datetime!(2024-08-18 23:30 UTC);
/// Newest hour in a fresh synthetic batch, 30 minutes before `NOW`.
pub const LAST_HOUR: OffsetDateTime = datetime!(2024-08-18 23:00 UTC);

mock! {
    pub Source {}
    #[async_trait]
    impl ForecastSource for Source {
        async fn fetch_forecast(&self, location: &Location) -> Result<String, extract::Error>;
    }
}

pub struct TestApp {
    pub dir: TempDir,
    pub pipeline: Pipeline,
    pub warehouse: Warehouse,
}

pub fn spawn_app(source: MockSource, isolate_failures: bool) -> TestApp {
    let warehouse = Warehouse::open_in_memory(test_logger()).unwrap();
    spawn_app_with_warehouse(source, isolate_failures, warehouse)
}

pub fn spawn_app_with_warehouse(
    source: MockSource,
    isolate_failures: bool,
    warehouse: Warehouse,
) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        test_logger(),
        Arc::new(source),
        PipelineSettings {
            raw_dir: dir.path().join("raw"),
            archive_dir: dir.path().join("processed"),
            isolate_failures,
        },
    );
    TestApp {
        dir,
        pipeline,
        warehouse,
    }
}

pub fn test_logger() -> Logger {
    Logger::root(Discard, o!())
}

pub fn johannesburg() -> Location {
    Location::new("Johannesburg", -26.2041, 28.0473)
}

pub fn cape_town() -> Location {
    Location::new("Cape Town", -33.9249, 18.4241)
}

pub fn durban() -> Location {
    Location::new("Durban", -29.8587, 31.0218)
}

/// An Open-Meteo style response with `hours` in-range hourly values ending
/// at `last_hour`.
pub fn forecast_body(location: &Location, last_hour: OffsetDateTime, hours: i64) -> Value {
    let first = last_hour - Duration::hours(hours - 1);
    let time: Vec<String> = (0..hours)
        .map(|i| {
            (first + Duration::hours(i))
                .format(format_description!("[year]-[month]-[day]T[hour]:[minute]"))
                .unwrap()
        })
        .collect();
    let temperature: Vec<f64> = (0..hours).map(|i| 8.0 + (i % 24) as f64 * 0.5).collect();
    let humidity: Vec<f64> = (0..hours).map(|i| 40.0 + (i % 24) as f64).collect();
    let precipitation: Vec<f64> = (0..hours).map(|i| if i % 12 == 0 { 0.2 } else { 0.0 }).collect();

    json!({
        "latitude": location.latitude,
        "longitude": location.longitude,
        "timezone": "GMT",
        "utc_offset_seconds": 0,
        "hourly": {
            "time": time,
            "temperature_2m": temperature,
            "relativehumidity_2m": humidity,
            "precipitation": precipitation
        }
    })
}

pub fn fresh_forecast(location: &Location) -> String {
    forecast_body(location, LAST_HOUR, 168).to_string()
}
