mod normalize;
mod quality_gate;

pub use normalize::{normalize, NormalizedRow};
pub use quality_gate::{
    Bounds, QualityGate, Rejection, ValidatedBatch, EXPECTED_ROWS, HUMIDITY_BOUNDS, MAX_STALENESS,
    PRECIPITATION_BOUNDS, TEMPERATURE_BOUNDS,
};
