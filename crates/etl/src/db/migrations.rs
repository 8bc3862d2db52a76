use duckdb::{params, Connection};
use slog::{info, Logger};
use std::collections::HashSet;
use time::OffsetDateTime;

use super::{sql_timestamp, Error};

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Applied in order, each at most once per database.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_weather_hourly",
        sql: include_str!("../../migrations/0001_create_weather_hourly.sql"),
    },
    Migration {
        version: 2,
        name: "add_location_name",
        sql: include_str!("../../migrations/0002_add_location_name.sql"),
    },
    Migration {
        version: 3,
        name: "create_etl_runs",
        sql: include_str!("../../migrations/0003_create_etl_runs.sql"),
    },
];

/// Brings the schema up to date and returns how many migrations were applied.
///
/// Databases created before versioning existed have no `schema_migrations`
/// table; every migration is written to be a no-op against the objects it
/// would have created, so they replay safely.
pub fn run_migrations(conn: &mut Connection, logger: &Logger) -> Result<usize, Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version BIGINT PRIMARY KEY,
            name VARCHAR NOT NULL,
            applied_at TIMESTAMP NOT NULL
        );",
    )?;

    let applied: HashSet<i64> = {
        let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
        let versions = stmt.query_map([], |row| row.get::<_, i64>(0))?;
        versions.collect::<Result<_, _>>()?
    };

    let mut count = 0;
    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at)
             VALUES (?, ?, CAST(? AS TIMESTAMP))",
            params![
                migration.version,
                migration.name,
                sql_timestamp(OffsetDateTime::now_utc())?
            ],
        )?;
        tx.commit()?;
        info!(logger, "applied warehouse migration"; "version" => migration.version, "name" => migration.name);
        count += 1;
    }
    Ok(count)
}
