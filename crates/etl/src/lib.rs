pub mod db;
mod domains;
mod locations;
mod pipeline;
mod utils;

pub use db::{RunRecord, Warehouse};
pub use domains::*;
pub use locations::*;
pub use pipeline::*;
pub use utils::*;

pub use domains::extract::{snapshot, DEFAULT_API_URL};
pub use domains::load::archive;
pub use domains::transform::{
    Bounds, EXPECTED_ROWS, HUMIDITY_BOUNDS, MAX_STALENESS, PRECIPITATION_BOUNDS,
    TEMPERATURE_BOUNDS,
};
