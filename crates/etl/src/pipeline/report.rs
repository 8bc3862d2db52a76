use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use super::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// Some locations failed but the run carried on past them.
    CompletedWithFailures,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::CompletedWithFailures => "completed_with_failures",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationResult {
    Loaded {
        rows_received: usize,
        rows_inserted: usize,
        archive_path: PathBuf,
    },
    Failed {
        kind: ErrorKind,
        reason: String,
    },
    /// Not attempted because an earlier location aborted the run.
    Skipped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationOutcome {
    pub location: String,
    pub result: LocationResult,
}

/// Timing and outcome of one pass over every configured location.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: OffsetDateTime,
    pub finished_at: OffsetDateTime,
    pub duration: Duration,
    pub status: RunStatus,
    pub locations: Vec<LocationOutcome>,
    pub rows_backfilled: usize,
    /// First failure of the run, if any.
    pub error: Option<String>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn locations_loaded(&self) -> usize {
        self.locations
            .iter()
            .filter(|o| matches!(o.result, LocationResult::Loaded { .. }))
            .count()
    }

    pub fn locations_failed(&self) -> usize {
        self.locations
            .iter()
            .filter(|o| matches!(o.result, LocationResult::Failed { .. }))
            .count()
    }

    pub fn rows_inserted(&self) -> usize {
        self.locations
            .iter()
            .map(|o| match o.result {
                LocationResult::Loaded { rows_inserted, .. } => rows_inserted,
                _ => 0,
            })
            .sum()
    }

    pub fn outcome(&self, location: &str) -> Option<&LocationResult> {
        self.locations
            .iter()
            .find(|o| o.location == location)
            .map(|o| &o.result)
    }
}
