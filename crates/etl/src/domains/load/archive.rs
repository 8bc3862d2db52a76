use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use parquet::{
    basic::{LogicalType, Repetition, Type as PhysicalType},
    schema::types::Type,
};
use parquet_derive::ParquetRecordWriter;
use slog::{info, Logger};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::{macros::format_description, Date};

use crate::domains::transform::NormalizedRow;
use crate::slugify;
use weather_etl_core::create_dir_all;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("archive io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to write parquet: {0}")]
    Parquet(#[from] ParquetError),
    #[error("failed to format archive timestamp: {0}")]
    TimeFormat(#[from] time::error::Format),
}

#[derive(Debug, ParquetRecordWriter)]
pub struct ArchivedObservation {
    pub timestamp: String,
    pub temperature_2m: f64,
    pub relativehumidity_2m: f64,
    pub precipitation: f64,
    pub location_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub load_date: String,
}

impl TryFrom<&NormalizedRow> for ArchivedObservation {
    type Error = time::error::Format;
    fn try_from(row: &NormalizedRow) -> Result<Self, Self::Error> {
        let timestamp_description =
            format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]Z");
        Ok(ArchivedObservation {
            timestamp: row.timestamp.format(timestamp_description)?,
            temperature_2m: row.temperature_c,
            relativehumidity_2m: row.relative_humidity_pct,
            precipitation: row.precipitation_mm,
            location_name: row.location_name.clone(),
            latitude: row.latitude,
            longitude: row.longitude,
            load_date: row.load_date.to_string(),
        })
    }
}

fn string_column(name: &str, repetition: Repetition) -> Result<Type, ParquetError> {
    Type::primitive_type_builder(name, PhysicalType::BYTE_ARRAY)
        .with_repetition(repetition)
        .with_logical_type(Some(LogicalType::String))
        .build()
}

fn double_column(name: &str) -> Result<Type, ParquetError> {
    Type::primitive_type_builder(name, PhysicalType::DOUBLE)
        .with_repetition(Repetition::REQUIRED)
        .build()
}

/// Column order must match the field order of [`ArchivedObservation`].
pub fn create_archive_schema() -> Result<Type, ParquetError> {
    Type::group_type_builder("weather_hourly")
        .with_fields(vec![
            Arc::new(string_column("timestamp", Repetition::REQUIRED)?),
            Arc::new(double_column("temperature_2m")?),
            Arc::new(double_column("relativehumidity_2m")?),
            Arc::new(double_column("precipitation")?),
            Arc::new(string_column("location_name", Repetition::OPTIONAL)?),
            Arc::new(double_column("latitude")?),
            Arc::new(double_column("longitude")?),
            Arc::new(string_column("load_date", Repetition::REQUIRED)?),
        ])
        .build()
}

/// `weather_<slug>_<YYYY-MM-DD>.parquet`
pub fn archive_file_name(location_name: &str, load_date: Date) -> String {
    format!("weather_{}_{}.parquet", slugify(location_name), load_date)
}

/// Writes one parquet file per location and load date. A second write for
/// the same pair replaces the first.
pub struct ArchiveWriter {
    logger: Logger,
    root: PathBuf,
}

impl ArchiveWriter {
    pub fn new(logger: Logger, root: impl Into<PathBuf>) -> Self {
        Self {
            logger,
            root: root.into(),
        }
    }

    pub fn path_for(&self, location_name: &str, load_date: Date) -> PathBuf {
        self.root.join(archive_file_name(location_name, load_date))
    }

    pub fn write(
        &self,
        rows: &[NormalizedRow],
        location_name: &str,
        load_date: Date,
    ) -> Result<PathBuf, Error> {
        create_dir_all(&self.root)?;
        let records = rows
            .iter()
            .map(ArchivedObservation::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let path = self.path_for(location_name, load_date);
        let staging = path.with_extension("parquet.tmp");
        if let Err(e) = write_parquet(&staging, &records) {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        fs::rename(&staging, &path)?;

        info!(
            self.logger,
            "archived {} rows to {}",
            records.len(),
            path.display()
        );
        Ok(path)
    }
}

fn write_parquet(path: &Path, records: &[ArchivedObservation]) -> Result<(), Error> {
    let file = File::create(path)?;
    let props = WriterProperties::builder().build();
    let mut writer =
        SerializedFileWriter::new(file, Arc::new(create_archive_schema()?), Arc::new(props))?;

    let mut row_group = writer.next_row_group()?;
    records.write_to_row_group(&mut row_group)?;
    row_group.close()?;
    writer.close()?;
    Ok(())
}
