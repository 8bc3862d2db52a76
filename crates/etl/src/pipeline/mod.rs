mod error;
mod report;

pub use error::{Error, ErrorKind};
pub use report::{LocationOutcome, LocationResult, RunReport, RunStatus};

use slog::{debug, error, info, o, warn, Logger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use time::{OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::domains::extract::{read_raw_snapshot, save_raw_snapshot, ForecastSource};
use crate::domains::load::ArchiveWriter;
use crate::domains::transform::{normalize, QualityGate};
use crate::{shared_slugs, Location, Warehouse};

/// Resolved paths and switches the pipeline needs; built from the CLI/config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub raw_dir: PathBuf,
    pub archive_dir: PathBuf,
    /// Keep going after a failed location instead of aborting the run.
    pub isolate_failures: bool,
}

struct Loaded {
    rows_received: usize,
    rows_inserted: usize,
    archive_path: PathBuf,
}

/// Runs extract, validate, normalize, archive and upsert for each location in
/// turn, then backfills legacy rows once at the end.
pub struct Pipeline {
    logger: Logger,
    source: Arc<dyn ForecastSource>,
    gate: QualityGate,
    archive: ArchiveWriter,
    raw_dir: PathBuf,
    isolate_failures: bool,
}

impl Pipeline {
    pub fn new(logger: Logger, source: Arc<dyn ForecastSource>, settings: PipelineSettings) -> Self {
        let archive = ArchiveWriter::new(logger.clone(), settings.archive_dir);
        Self {
            logger,
            source,
            gate: QualityGate::default(),
            archive,
            raw_dir: settings.raw_dir,
            isolate_failures: settings.isolate_failures,
        }
    }

    pub async fn run(&self, warehouse: &mut Warehouse, locations: &[Location]) -> RunReport {
        self.run_at(warehouse, locations, OffsetDateTime::now_utc())
            .await
    }

    /// `now` is the processing instant used for freshness and the load date.
    pub async fn run_at(
        &self,
        warehouse: &mut Warehouse,
        locations: &[Location],
        now: OffsetDateTime,
    ) -> RunReport {
        let run_id = Uuid::now_v7();
        let started_at = OffsetDateTime::now_utc();
        let timer = Instant::now();
        let logger = self.logger.new(o!("run_id" => run_id.to_string()));
        info!(logger, "weather pipeline started"; "locations" => locations.len());
        for (first, second) in shared_slugs(locations) {
            warn!(logger, "locations share a file slug, the later archive overwrites the earlier one";
                "slug" => first.slug(),
                "first" => &first.name,
                "second" => &second.name);
        }

        let mut outcomes = Vec::with_capacity(locations.len());
        let mut first_error: Option<String> = None;
        let mut aborted = false;

        for location in locations {
            if aborted {
                outcomes.push(LocationOutcome {
                    location: location.name.clone(),
                    result: LocationResult::Skipped,
                });
                continue;
            }

            let location_logger = logger.new(o!("location" => location.name.clone()));
            let started = Instant::now();
            let result = match self
                .process_location(&location_logger, warehouse, location, now)
                .await
            {
                Ok(loaded) => {
                    info!(location_logger, "location loaded";
                        "rows_received" => loaded.rows_received,
                        "rows_inserted" => loaded.rows_inserted,
                        "archive" => %loaded.archive_path.display(),
                        "duration_ms" => started.elapsed().as_millis() as u64);
                    LocationResult::Loaded {
                        rows_received: loaded.rows_received,
                        rows_inserted: loaded.rows_inserted,
                        archive_path: loaded.archive_path,
                    }
                }
                Err(e) => {
                    error!(location_logger, "location failed";
                        "kind" => e.kind().as_str(),
                        "retryable" => e.is_retryable(),
                        "coordinates" => format!("{}, {}", location.latitude, location.longitude),
                        "duration_ms" => started.elapsed().as_millis() as u64,
                        "error" => %e);
                    first_error.get_or_insert_with(|| format!("{}: {}", location.name, e));
                    if !self.isolate_failures {
                        aborted = true;
                    }
                    LocationResult::Failed {
                        kind: e.kind(),
                        reason: e.to_string(),
                    }
                }
            };
            outcomes.push(LocationOutcome {
                location: location.name.clone(),
                result,
            });
        }

        let mut rows_backfilled = 0;
        let mut backfill_failed = false;
        if aborted {
            warn!(logger, "skipping backfill, run aborted");
        } else {
            match warehouse.backfill(locations) {
                Ok(updated) => {
                    info!(logger, "backfill finished"; "rows_backfilled" => updated);
                    rows_backfilled = updated;
                }
                Err(e) => {
                    let e = Error::from(e);
                    error!(logger, "backfill failed";
                        "kind" => e.kind().as_str(),
                        "retryable" => e.is_retryable(),
                        "error" => %e);
                    first_error.get_or_insert_with(|| format!("backfill: {}", e));
                    backfill_failed = true;
                }
            }
        }

        let failed = outcomes
            .iter()
            .any(|o| matches!(o.result, LocationResult::Failed { .. }));
        let status = if aborted || backfill_failed {
            RunStatus::Failed
        } else if failed {
            RunStatus::CompletedWithFailures
        } else {
            RunStatus::Succeeded
        };

        let report = RunReport {
            run_id,
            started_at,
            finished_at: OffsetDateTime::now_utc(),
            duration: timer.elapsed(),
            status,
            locations: outcomes,
            rows_backfilled,
            error: first_error,
        };

        if let Err(e) = warehouse.record_run(&report) {
            error!(logger, "failed to record run"; "error" => %e);
        }

        info!(logger, "weather pipeline ended";
            "status" => report.status.as_str(),
            "locations_loaded" => report.locations_loaded(),
            "locations_failed" => report.locations_failed(),
            "rows_inserted" => report.rows_inserted(),
            "rows_backfilled" => report.rows_backfilled,
            "duration_ms" => report.duration.as_millis() as u64);
        report
    }

    async fn process_location(
        &self,
        logger: &Logger,
        warehouse: &mut Warehouse,
        location: &Location,
        now: OffsetDateTime,
    ) -> Result<Loaded, Error> {
        info!(logger, "extracting"; "latitude" => location.latitude, "longitude" => location.longitude);
        let body = self.source.fetch_forecast(location).await?;
        let snapshot_path =
            save_raw_snapshot(&self.raw_dir, location, &body, OffsetDateTime::now_utc())?;
        debug!(logger, "saved raw snapshot"; "path" => %snapshot_path.display());

        let raw = read_raw_snapshot(&snapshot_path)?;
        let validated = match self.gate.validate(&raw, now) {
            Ok(validated) => validated,
            Err(rejection) => {
                warn!(logger, "batch rejected";
                    "kind" => rejection.kind().as_str(),
                    "reason" => %rejection);
                return Err(rejection.into());
            }
        };
        debug!(logger, "batch passed quality gate"; "rows" => validated.len());

        let load_date = now.to_offset(UtcOffset::UTC).date();
        let rows = normalize(validated, location, load_date);
        let archive_path = self.archive.write(&rows, &location.name, load_date)?;
        let rows_inserted = warehouse.upsert(&rows)?;

        Ok(Loaded {
            rows_received: rows.len(),
            rows_inserted,
            archive_path,
        })
    }
}
