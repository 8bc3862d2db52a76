use duckdb::{params, Connection, ToSql};
use slog::{debug, info, warn, Logger};
use std::path::Path;
use time::{macros::format_description, Date};

use super::{parse_sql_timestamp, run_migrations, sql_timestamp};
use crate::{Location, NormalizedRow, RunReport};
use weather_etl_core::ensure_parent_dir;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Failed to query duckdb: {0}")]
    Query(#[from] duckdb::Error),
    #[error("Failed to format time string: {0}")]
    TimeFormat(#[from] time::error::Format),
    #[error("Failed to parse time string: {0}")]
    TimeParse(#[from] time::error::Parse),
    #[error("Failed to prepare warehouse directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Inserts the row only when no row with the same
/// `(timestamp, latitude, longitude, location_name)` exists. A missing
/// location name only matches another missing name.
const INSERT_IF_ABSENT: &str = "
    INSERT INTO weather_hourly (
        location_name, timestamp, temperature_2m, relativehumidity_2m,
        precipitation, latitude, longitude, load_date
    )
    SELECT
        CAST(? AS VARCHAR),
        CAST(? AS TIMESTAMP),
        CAST(? AS DOUBLE),
        CAST(? AS DOUBLE),
        CAST(? AS DOUBLE),
        CAST(? AS DOUBLE),
        CAST(? AS DOUBLE),
        CAST(? AS DATE)
    WHERE NOT EXISTS (
        SELECT 1 FROM weather_hourly
        WHERE timestamp = CAST(? AS TIMESTAMP)
          AND latitude = CAST(? AS DOUBLE)
          AND longitude = CAST(? AS DOUBLE)
          AND location_name IS NOT DISTINCT FROM CAST(? AS VARCHAR)
    )";

/// Names legacy rows whose coordinates equal the location's exactly. A row
/// is left alone when the named version of it already exists, and of several
/// identical legacy rows only the first one is named.
const BACKFILL_LOCATION: &str = "
    UPDATE weather_hourly AS target
    SET location_name = CAST(? AS VARCHAR)
    WHERE target.location_name IS NULL
      AND target.latitude = CAST(? AS DOUBLE)
      AND target.longitude = CAST(? AS DOUBLE)
      AND NOT EXISTS (
          SELECT 1 FROM weather_hourly AS named
          WHERE named.location_name = CAST(? AS VARCHAR)
            AND named.timestamp = target.timestamp
            AND named.latitude = target.latitude
            AND named.longitude = target.longitude
      )
      AND target.rowid = (
          SELECT MIN(legacy.rowid) FROM weather_hourly AS legacy
          WHERE legacy.location_name IS NULL
            AND legacy.timestamp = target.timestamp
            AND legacy.latitude = target.latitude
            AND legacy.longitude = target.longitude
      )";

const INSERT_RUN: &str = "
    INSERT INTO etl_runs (
        run_id, started_at, finished_at, duration_ms, status,
        locations_loaded, locations_failed, rows_inserted, rows_backfilled, error
    )
    VALUES (?, CAST(? AS TIMESTAMP), CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?, ?)";

const SELECT_ROWS: &str = "
    SELECT
        CAST(timestamp AS VARCHAR),
        temperature_2m,
        relativehumidity_2m,
        precipitation,
        location_name,
        latitude,
        longitude,
        CAST(load_date AS VARCHAR)
    FROM weather_hourly";

/// One row of the `etl_runs` audit table.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub status: String,
    pub duration_ms: i64,
    pub locations_loaded: i64,
    pub locations_failed: i64,
    pub rows_inserted: i64,
    pub rows_backfilled: i64,
    pub error: Option<String>,
}

type StoredRow = (String, f64, f64, f64, Option<String>, f64, f64, String);

/// The duckdb file holding `weather_hourly` and the run audit log.
pub struct Warehouse {
    conn: Connection,
    logger: Logger,
}

impl Warehouse {
    pub fn open(path: impl AsRef<Path>, logger: Logger) -> Result<Self, Error> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;
        let conn = Connection::open(path)?;
        info!(logger, "opened warehouse"; "path" => %path.display());
        Self::with_connection(conn, logger)
    }

    pub fn open_in_memory(logger: Logger) -> Result<Self, Error> {
        Self::with_connection(Connection::open_in_memory()?, logger)
    }

    /// Runs any pending migrations before handing the connection out.
    pub fn with_connection(mut conn: Connection, logger: Logger) -> Result<Self, Error> {
        let applied = run_migrations(&mut conn, &logger)?;
        debug!(logger, "warehouse schema ready"; "migrations_applied" => applied);
        Ok(Self { conn, logger })
    }

    /// Inserts every row whose natural key is not yet present, all in one
    /// transaction. Returns the number of rows actually inserted.
    pub fn upsert(&mut self, rows: &[NormalizedRow]) -> Result<usize, Error> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(INSERT_IF_ABSENT)?;
            for row in rows {
                let timestamp = sql_timestamp(row.timestamp)?;
                let load_date = row.load_date.to_string();
                inserted += stmt.execute(params![
                    row.location_name,
                    timestamp,
                    row.temperature_c,
                    row.relative_humidity_pct,
                    row.precipitation_mm,
                    row.latitude,
                    row.longitude,
                    load_date,
                    timestamp,
                    row.latitude,
                    row.longitude,
                    row.location_name,
                ])?;
            }
        }
        tx.commit()?;

        debug!(self.logger, "upserted rows"; "received" => rows.len(), "inserted" => inserted);
        Ok(inserted)
    }

    /// Attaches location names to rows loaded before names were stored.
    /// Coordinates must match exactly. Safe to run repeatedly.
    ///
    /// When two locations share exact coordinates, the one listed first
    /// claims the unnamed rows and the later one finds none left.
    pub fn backfill(&mut self, locations: &[Location]) -> Result<usize, Error> {
        let tx = self.conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(BACKFILL_LOCATION)?;
            for (i, location) in locations.iter().enumerate() {
                if let Some(earlier) = locations[..i].iter().find(|earlier| {
                    earlier.latitude == location.latitude
                        && earlier.longitude == location.longitude
                }) {
                    warn!(self.logger, "location shares coordinates with an earlier one, it gets no backfilled rows";
                        "location" => &location.name,
                        "earlier" => &earlier.name);
                }
                let count = stmt.execute(params![
                    location.name,
                    location.latitude,
                    location.longitude,
                    location.name,
                ])?;
                if count > 0 {
                    info!(self.logger, "backfilled location names"; "location" => &location.name, "rows" => count);
                }
                updated += count;
            }
        }
        tx.commit()?;
        Ok(updated)
    }

    pub fn record_run(&self, report: &RunReport) -> Result<(), Error> {
        self.conn.execute(
            INSERT_RUN,
            params![
                report.run_id.to_string(),
                sql_timestamp(report.started_at)?,
                sql_timestamp(report.finished_at)?,
                report.duration.as_millis() as i64,
                report.status.as_str(),
                report.locations_loaded() as i64,
                report.locations_failed() as i64,
                report.rows_inserted() as i64,
                report.rows_backfilled as i64,
                report.error,
            ],
        )?;
        Ok(())
    }

    pub fn row_count(&self) -> Result<usize, Error> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM weather_hourly", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn unnamed_row_count(&self) -> Result<usize, Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM weather_hourly WHERE location_name IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn rows(&self) -> Result<Vec<NormalizedRow>, Error> {
        let sql = format!("{SELECT_ROWS} ORDER BY timestamp, location_name NULLS FIRST");
        self.query_rows(&sql, &[])
    }

    pub fn rows_for_location(&self, location_name: &str) -> Result<Vec<NormalizedRow>, Error> {
        let sql = format!("{SELECT_ROWS} WHERE location_name = ? ORDER BY timestamp");
        self.query_rows(&sql, &[&location_name])
    }

    /// Most recent run last.
    pub fn runs(&self) -> Result<Vec<RunRecord>, Error> {
        let mut stmt = self.conn.prepare(
            "SELECT
                run_id,
                status,
                duration_ms,
                CAST(locations_loaded AS BIGINT),
                CAST(locations_failed AS BIGINT),
                rows_inserted,
                rows_backfilled,
                error
            FROM etl_runs
            ORDER BY started_at, run_id",
        )?;
        let runs = stmt
            .query_map([], |row| {
                Ok(RunRecord {
                    run_id: row.get(0)?,
                    status: row.get(1)?,
                    duration_ms: row.get(2)?,
                    locations_loaded: row.get(3)?,
                    locations_failed: row.get(4)?,
                    rows_inserted: row.get(5)?,
                    rows_backfilled: row.get(6)?,
                    error: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn query_rows(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<NormalizedRow>, Error> {
        let mut stmt = self.conn.prepare(sql)?;
        let stored = stmt
            .query_map(params, |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ))
            })?
            .collect::<Result<Vec<StoredRow>, _>>()?;

        stored
            .into_iter()
            .map(
                |(timestamp, temperature, humidity, precipitation, name, latitude, longitude, load_date)| {
                    Ok(NormalizedRow {
                        timestamp: parse_sql_timestamp(&timestamp)?,
                        temperature_c: temperature,
                        relative_humidity_pct: humidity,
                        precipitation_mm: precipitation,
                        location_name: name,
                        latitude,
                        longitude,
                        load_date: Date::parse(&load_date, format_description!("[year]-[month]-[day]"))?,
                    })
                },
            )
            .collect()
    }
}
