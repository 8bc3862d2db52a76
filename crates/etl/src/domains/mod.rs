pub mod extract;
pub mod load;
pub mod transform;

pub use extract::{
    build_weather_url, read_raw_snapshot, save_raw_snapshot, ForecastSource, HourlySeries,
    OpenMeteoClient, RawObservationBatch,
};
pub use load::{archive_file_name, ArchiveWriter};
pub use transform::{normalize, NormalizedRow, QualityGate, Rejection, ValidatedBatch};
