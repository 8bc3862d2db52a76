use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use time::{macros::format_description, OffsetDateTime};

use crate::Location;
use weather_etl_core::create_dir_all;

/// One forecast response for one location, as saved on disk by the extract step.
///
/// Every field is optional so that a payload with the wrong shape still
/// parses; the quality gate decides whether the shape is acceptable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservationBatch {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    /// Offset of the `hourly.time` values from UTC
    pub utc_offset_seconds: Option<i32>,
    pub hourly: Option<HourlySeries>,
}

/// Parallel arrays, one entry per hour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlySeries {
    pub time: Option<Vec<Option<String>>>,
    pub temperature_2m: Option<Vec<Option<f64>>>,
    #[serde(alias = "relative_humidity_2m")]
    pub relativehumidity_2m: Option<Vec<Option<f64>>>,
    pub precipitation: Option<Vec<Option<f64>>>,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to access raw snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("raw snapshot {path} is not a forecast payload: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Writes a fetched response body to
/// `<raw_dir>/weather_raw_<slug>_<YYYY-MM-DDTHH-MM-SS>.json`.
///
/// Bodies that are valid JSON are pretty printed, anything else is kept
/// verbatim so the failure can be inspected later.
pub fn save_raw_snapshot(
    raw_dir: &Path,
    location: &Location,
    body: &str,
    fetched_at: OffsetDateTime,
) -> Result<PathBuf, Error> {
    create_dir_all(raw_dir).map_err(|source| Error::Io {
        path: raw_dir.to_path_buf(),
        source,
    })?;

    let stamp = fetched_at
        .format(format_description!(
            "[year]-[month]-[day]T[hour]-[minute]-[second]"
        ))
        .unwrap_or_else(|_| fetched_at.unix_timestamp().to_string());
    let path = raw_dir.join(format!("weather_raw_{}_{}.json", location.slug(), stamp));

    let contents = match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_owned()),
        Err(_) => body.to_owned(),
    };

    fs::write(&path, contents).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

pub fn read_raw_snapshot(path: &Path) -> Result<RawObservationBatch, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| Error::Malformed {
        path: path.to_path_buf(),
        source,
    })
}
