mod open_meteo;
pub mod snapshot;

pub use open_meteo::{
    build_weather_url, Error, ForecastSource, OpenMeteoClient, DEFAULT_API_URL, HOURLY_FIELDS,
};
pub use snapshot::{read_raw_snapshot, save_raw_snapshot, HourlySeries, RawObservationBatch};
