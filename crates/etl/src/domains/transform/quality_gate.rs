use std::collections::HashSet;
use std::fmt;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Duration,
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

use crate::domains::extract::RawObservationBatch;
use crate::ErrorKind;

/// A 7 day hourly forecast.
pub const EXPECTED_ROWS: usize = 24 * 7;

/// Oldest acceptable age of the latest observation in a batch.
pub const MAX_STALENESS: Duration = Duration::hours(6);

pub const TEMPERATURE_BOUNDS: Bounds = Bounds::between(-90.0, 60.0);
pub const HUMIDITY_BOUNDS: Bounds = Bounds::between(0.0, 100.0);
pub const PRECIPITATION_BOUNDS: Bounds = Bounds::at_least(0.0);

/// Inclusive physical limits for one measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: Option<f64>,
}

impl Bounds {
    pub const fn between(min: f64, max: f64) -> Self {
        Bounds {
            min,
            max: Some(max),
        }
    }

    pub const fn at_least(min: f64) -> Self {
        Bounds { min, max: None }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && self.max.map_or(true, |max| value <= max)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}, {}]", self.min, max),
            None => write!(f, ">= {}", self.min),
        }
    }
}

/// Why a batch was refused. A batch is accepted whole or not at all.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("structural check failed: {0}")]
    Structural(String),
    #[error("completeness check failed: `{field}` has {actual} rows, expected {expected}")]
    Completeness {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("continuity check failed: {0}")]
    Continuity(String),
    #[error(
        "freshness check failed: latest observation is {age_hours:.2} hours old, limit is {limit_hours} hours"
    )]
    Freshness { age_hours: f64, limit_hours: i64 },
    #[error("range check failed: `{field}` {} at index {index}, allowed {bounds}", describe_value(.value))]
    Range {
        field: &'static str,
        index: usize,
        value: Option<f64>,
        bounds: Bounds,
    },
}

fn describe_value(value: &Option<f64>) -> String {
    match value {
        Some(value) => format!("value {}", value),
        None => String::from("is null"),
    }
}

impl Rejection {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Rejection::Structural(_) => ErrorKind::Structural,
            Rejection::Completeness { .. } => ErrorKind::Completeness,
            Rejection::Continuity(_) => ErrorKind::Continuity,
            Rejection::Freshness { .. } => ErrorKind::Freshness,
            Rejection::Range { .. } => ErrorKind::Range,
        }
    }
}

/// A batch that passed every check, with timestamps parsed to UTC.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedBatch {
    pub timestamps: Vec<OffsetDateTime>,
    pub temperature_2m: Vec<f64>,
    pub relativehumidity_2m: Vec<f64>,
    pub precipitation: Vec<f64>,
}

impl ValidatedBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

struct Columns<'a> {
    time: &'a [Option<String>],
    temperature_2m: &'a [Option<f64>],
    relativehumidity_2m: &'a [Option<f64>],
    precipitation: &'a [Option<f64>],
}

#[derive(Debug, Clone)]
pub struct QualityGate {
    expected_rows: usize,
    max_staleness: Duration,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(EXPECTED_ROWS, MAX_STALENESS)
    }
}

impl QualityGate {
    pub fn new(expected_rows: usize, max_staleness: Duration) -> Self {
        Self {
            expected_rows,
            max_staleness,
        }
    }

    /// Runs the checks in order: structure, completeness, continuity,
    /// freshness, ranges. The first failure is returned.
    pub fn validate(
        &self,
        batch: &RawObservationBatch,
        now: OffsetDateTime,
    ) -> Result<ValidatedBatch, Rejection> {
        let columns = check_structure(batch)?;
        self.check_completeness(&columns)?;

        let timestamps = parse_timestamps(columns.time, batch.utc_offset_seconds)?;
        check_continuity(&timestamps)?;
        self.check_freshness(&timestamps, now)?;

        let temperature_2m =
            check_range("temperature_2m", columns.temperature_2m, TEMPERATURE_BOUNDS)?;
        let relativehumidity_2m = check_range(
            "relativehumidity_2m",
            columns.relativehumidity_2m,
            HUMIDITY_BOUNDS,
        )?;
        let precipitation =
            check_range("precipitation", columns.precipitation, PRECIPITATION_BOUNDS)?;

        Ok(ValidatedBatch {
            timestamps,
            temperature_2m,
            relativehumidity_2m,
            precipitation,
        })
    }

    fn check_completeness(&self, columns: &Columns<'_>) -> Result<(), Rejection> {
        let lengths = [
            ("time", columns.time.len()),
            ("temperature_2m", columns.temperature_2m.len()),
            ("relativehumidity_2m", columns.relativehumidity_2m.len()),
            ("precipitation", columns.precipitation.len()),
        ];
        for (field, actual) in lengths {
            if actual != self.expected_rows {
                return Err(Rejection::Completeness {
                    field,
                    expected: self.expected_rows,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn check_freshness(
        &self,
        timestamps: &[OffsetDateTime],
        now: OffsetDateTime,
    ) -> Result<(), Rejection> {
        let Some(latest) = timestamps.iter().max() else {
            return Ok(());
        };
        let age = now - *latest;
        if age > self.max_staleness {
            return Err(Rejection::Freshness {
                age_hours: age.as_seconds_f64() / 3600.0,
                limit_hours: self.max_staleness.whole_hours(),
            });
        }
        Ok(())
    }
}

fn check_structure(batch: &RawObservationBatch) -> Result<Columns<'_>, Rejection> {
    let hourly = batch
        .hourly
        .as_ref()
        .ok_or_else(|| Rejection::Structural(String::from("payload has no `hourly` section")))?;

    Ok(Columns {
        time: required(&hourly.time, "time")?,
        temperature_2m: required(&hourly.temperature_2m, "temperature_2m")?,
        relativehumidity_2m: required(&hourly.relativehumidity_2m, "relativehumidity_2m")?,
        precipitation: required(&hourly.precipitation, "precipitation")?,
    })
}

fn required<'a, T>(column: &'a Option<Vec<T>>, field: &str) -> Result<&'a [T], Rejection> {
    column
        .as_deref()
        .ok_or_else(|| Rejection::Structural(format!("`hourly` section is missing `{}`", field)))
}

fn parse_timestamps(
    time: &[Option<String>],
    utc_offset_seconds: Option<i32>,
) -> Result<Vec<OffsetDateTime>, Rejection> {
    let offset = match utc_offset_seconds {
        Some(seconds) => UtcOffset::from_whole_seconds(seconds).map_err(|e| {
            Rejection::Structural(format!("invalid utc_offset_seconds {}: {}", seconds, e))
        })?,
        None => UtcOffset::UTC,
    };

    time.iter()
        .enumerate()
        .map(|(index, value)| {
            let raw = value
                .as_deref()
                .ok_or_else(|| Rejection::Continuity(format!("null timestamp at index {}", index)))?;
            parse_timestamp(raw, offset).ok_or_else(|| {
                Rejection::Structural(format!(
                    "unparseable timestamp `{}` at index {}",
                    raw, index
                ))
            })
        })
        .collect()
}

/// Accepts RFC 3339 or the API's zone-less `YYYY-MM-DDTHH:MM[:SS]`, which is
/// local to `offset`. The result is always in UTC.
pub(crate) fn parse_timestamp(raw: &str, offset: UtcOffset) -> Option<OffsetDateTime> {
    if let Ok(parsed) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(parsed.to_offset(UtcOffset::UTC));
    }
    PrimitiveDateTime::parse(raw, format_description!("[year]-[month]-[day]T[hour]:[minute]"))
        .or_else(|_| {
            PrimitiveDateTime::parse(
                raw,
                format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
            )
        })
        .ok()
        .map(|local| local.assume_offset(offset).to_offset(UtcOffset::UTC))
}

fn check_continuity(timestamps: &[OffsetDateTime]) -> Result<(), Rejection> {
    let mut seen = HashSet::with_capacity(timestamps.len());
    for (index, timestamp) in timestamps.iter().enumerate() {
        if !seen.insert(*timestamp) {
            return Err(Rejection::Continuity(format!(
                "duplicate timestamp {} at index {}",
                display(timestamp),
                index
            )));
        }
        if timestamp.minute() != 0 || timestamp.second() != 0 || timestamp.nanosecond() != 0 {
            return Err(Rejection::Continuity(format!(
                "timestamp {} at index {} is not on the hour",
                display(timestamp),
                index
            )));
        }
    }

    let mut sorted = timestamps.to_vec();
    sorted.sort();
    for pair in sorted.windows(2) {
        let step = pair[1] - pair[0];
        if step != Duration::HOUR {
            return Err(Rejection::Continuity(format!(
                "{} missing hour(s) between {} and {}",
                step.whole_hours() - 1,
                display(&pair[0]),
                display(&pair[1])
            )));
        }
    }

    // contiguous as a set, so anything left is ordering
    for (index, pair) in timestamps.windows(2).enumerate() {
        if pair[1] < pair[0] {
            return Err(Rejection::Continuity(format!(
                "timestamp {} at index {} is out of order",
                display(&pair[1]),
                index + 1
            )));
        }
    }
    Ok(())
}

fn check_range(
    field: &'static str,
    values: &[Option<f64>],
    bounds: Bounds,
) -> Result<Vec<f64>, Rejection> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| match value {
            Some(v) if bounds.contains(*v) => Ok(*v),
            _ => Err(Rejection::Range {
                field,
                index,
                value: *value,
                bounds,
            }),
        })
        .collect()
}

fn display(timestamp: &OffsetDateTime) -> String {
    timestamp
        .format(&Rfc3339)
        .unwrap_or_else(|_| timestamp.to_string())
}
