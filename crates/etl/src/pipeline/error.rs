use std::fmt;

use crate::db;
use crate::domains::extract::{self, snapshot};
use crate::domains::load::archive;
use crate::domains::transform::Rejection;

/// Coarse classification used for logging and the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Structural,
    Completeness,
    Continuity,
    Freshness,
    Range,
    Storage,
    Extract,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Structural => "structural",
            ErrorKind::Completeness => "completeness",
            ErrorKind::Continuity => "continuity",
            ErrorKind::Freshness => "freshness",
            ErrorKind::Range => "range",
            ErrorKind::Storage => "storage",
            ErrorKind::Extract => "extract",
        }
    }

    /// Rejections are deterministic: the same payload fails the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Storage | ErrorKind::Extract)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("batch rejected: {0}")]
    Rejected(#[from] Rejection),
    #[error("extraction failed: {0}")]
    Extract(#[from] extract::Error),
    #[error("raw snapshot failed: {0}")]
    Snapshot(#[source] snapshot::Error),
    #[error("archive failed: {0}")]
    Archive(#[from] archive::Error),
    #[error("warehouse failed: {0}")]
    Warehouse(#[from] db::Error),
}

/// A payload that does not deserialize is a structural rejection, not a
/// storage problem.
impl From<snapshot::Error> for Error {
    fn from(e: snapshot::Error) -> Self {
        match e {
            snapshot::Error::Malformed { path, source } => Error::Rejected(Rejection::Structural(
                format!("{} could not be parsed: {}", path.display(), source),
            )),
            io => Error::Snapshot(io),
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Rejected(rejection) => rejection.kind(),
            Error::Extract(_) => ErrorKind::Extract,
            Error::Snapshot(_) | Error::Archive(_) | Error::Warehouse(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
