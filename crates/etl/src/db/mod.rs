mod migrations;
mod warehouse;

pub use migrations::{run_migrations, Migration, MIGRATIONS};
pub use warehouse::{Error, RunRecord, Warehouse};

use time::{macros::format_description, OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// Timestamps cross into duckdb as naive UTC strings and are cast there.
pub(crate) fn sql_timestamp(value: OffsetDateTime) -> Result<String, time::error::Format> {
    value
        .to_offset(UtcOffset::UTC)
        .format(format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
}

pub(crate) fn parse_sql_timestamp(value: &str) -> Result<OffsetDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )
    .map(PrimitiveDateTime::assume_utc)
}
