//! Weather ETL Core Library
//!
//! Shared utilities for the pipeline crate:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - Common defaults

mod config;
pub mod fs;

pub use config::{find_config_file, load_config, ConfigSource};
pub use fs::{create_dir_all, ensure_parent_dir};

/// Application name used for XDG paths
pub const APP_NAME: &str = "weather-etl";

/// Default interval between pipeline runs (1 hour)
pub const DEFAULT_FETCH_INTERVAL: u64 = 3600;

/// Default HTTP timeout for the forecast request, in seconds
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 10;
