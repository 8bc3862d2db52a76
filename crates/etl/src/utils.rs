use anyhow::{bail, Context};
use clap::Parser;
use slog::{o, Drain, Level, Logger};
use std::{env, fs::OpenOptions, path::PathBuf, time::Duration};
use time::OffsetDateTime;
use weather_etl_core::{
    create_dir_all, find_config_file, load_config, ConfigSource, DEFAULT_FETCH_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT,
};

use crate::{default_locations, Location, DEFAULT_API_URL};

#[derive(Parser, Clone, Debug, serde::Deserialize, Default)]
#[command(
    author,
    version,
    about = "Weather ETL - Validates hourly forecasts, archives them to parquet and loads them into duckdb"
)]
pub struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $WEATHER_ETL_CONFIG, ./pipeline.toml,
    /// $XDG_CONFIG_HOME/weather-etl/pipeline.toml, /etc/weather-etl/pipeline.toml
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "WEATHER_ETL_LEVEL")]
    pub level: Option<String>,

    /// Directory for dated log files, terminal only when unset
    #[arg(long, env = "WEATHER_ETL_LOG_DIR")]
    pub log_dir: Option<String>,

    /// Directory for raw API responses
    #[arg(short, long, env = "WEATHER_ETL_RAW_DIR")]
    pub raw_dir: Option<String>,

    /// Directory for parquet archives
    #[arg(short, long, env = "WEATHER_ETL_PROCESSED_DIR")]
    pub processed_dir: Option<String>,

    /// Path to the duckdb warehouse file
    #[arg(short, long, env = "WEATHER_ETL_WAREHOUSE_PATH")]
    pub warehouse_path: Option<String>,

    /// Forecast API endpoint
    #[arg(short, long, env = "WEATHER_ETL_API_URL")]
    pub api_url: Option<String>,

    /// HTTP User-Agent header for forecast requests
    #[arg(short, long, env = "WEATHER_ETL_USER_AGENT")]
    pub user_agent: Option<String>,

    /// Forecast request timeout in seconds
    #[arg(
        short = 't',
        long,
        env = "WEATHER_ETL_REQUEST_TIMEOUT",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout: Option<u64>,

    /// Seconds between pipeline runs
    #[arg(
        short,
        long,
        env = "WEATHER_ETL_SLEEP_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub sleep_interval: Option<u64>,

    /// Run a single pass and exit
    #[arg(long, env = "WEATHER_ETL_ONCE")]
    #[serde(default)]
    pub once: bool,

    /// Keep processing the remaining locations after one fails
    #[arg(long, env = "WEATHER_ETL_ISOLATE_FAILURES")]
    #[serde(default)]
    pub isolate_failures: bool,

    /// Only settable from the config file, as `[[locations]]` tables
    #[arg(skip)]
    #[serde(default)]
    pub locations: Option<Vec<Location>>,
}

impl Cli {
    pub fn log_dir(&self) -> Option<PathBuf> {
        self.log_dir.as_ref().map(PathBuf::from)
    }

    pub fn raw_dir(&self) -> PathBuf {
        PathBuf::from(self.raw_dir.as_deref().unwrap_or("data/raw"))
    }

    pub fn processed_dir(&self) -> PathBuf {
        PathBuf::from(self.processed_dir.as_deref().unwrap_or("data/processed"))
    }

    pub fn warehouse_path(&self) -> PathBuf {
        PathBuf::from(
            self.warehouse_path
                .as_deref()
                .unwrap_or("data/warehouse/weather.duckdb"),
        )
    }

    pub fn api_url(&self) -> String {
        self.api_url
            .clone()
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(|| format!("weather-etl/{}", env!("CARGO_PKG_VERSION")))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
    }

    pub fn sleep_interval(&self) -> u64 {
        self.sleep_interval.unwrap_or(DEFAULT_FETCH_INTERVAL)
    }

    /// Configured locations in file order, Johannesburg when none are listed.
    pub fn locations(&self) -> Vec<Location> {
        match &self.locations {
            Some(locations) if !locations.is_empty() => locations.clone(),
            _ => default_locations(),
        }
    }

    /// Catches values the config file can set but clap never saw.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sleep_interval == Some(0) {
            bail!("sleep_interval must be at least 1 second");
        }
        if self.request_timeout == Some(0) {
            bail!("request_timeout must be at least 1 second");
        }
        Ok(())
    }
}

/// Load configuration from CLI args, config file, and environment
pub fn get_config_info() -> anyhow::Result<(Cli, ConfigSource)> {
    let cli_args = Cli::parse();

    let source = if let Some(ref path) = cli_args.config {
        ConfigSource::Explicit(path.into())
    } else {
        find_config_file("WEATHER_ETL_CONFIG", "pipeline.toml")
    };

    let file_config: Cli = load_config(&source)?;
    let cli = merge(cli_args, file_config);
    cli.validate()
        .with_context(|| format!("Invalid configuration from {}", source))?;
    Ok((cli, source))
}

/// CLI args override file config (env vars are handled by clap)
pub fn merge(cli_args: Cli, file_config: Cli) -> Cli {
    Cli {
        config: cli_args.config,
        level: cli_args.level.or(file_config.level),
        log_dir: cli_args.log_dir.or(file_config.log_dir),
        raw_dir: cli_args.raw_dir.or(file_config.raw_dir),
        processed_dir: cli_args.processed_dir.or(file_config.processed_dir),
        warehouse_path: cli_args.warehouse_path.or(file_config.warehouse_path),
        api_url: cli_args.api_url.or(file_config.api_url),
        user_agent: cli_args.user_agent.or(file_config.user_agent),
        request_timeout: cli_args.request_timeout.or(file_config.request_timeout),
        sleep_interval: cli_args.sleep_interval.or(file_config.sleep_interval),
        once: cli_args.once || file_config.once,
        isolate_failures: cli_args.isolate_failures || file_config.isolate_failures,
        locations: file_config.locations,
    }
}

pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::Trace,
        "debug" => Level::Debug,
        "info" => Level::Info,
        "warn" => Level::Warning,
        "error" => Level::Error,
        _ => Level::Info,
    }
}

/// Terminal logger, duplicated into `<log_dir>/<date>.log` when a log
/// directory is configured.
pub fn setup_logger(cli: &Cli) -> anyhow::Result<Logger> {
    let log_level = match cli.level.as_ref() {
        Some(level) => parse_level(level),
        None => parse_level(&env::var("RUST_LOG").unwrap_or_default()),
    };

    let decorator = slog_term::TermDecorator::new().build();
    let term = slog_term::CompactFormat::new(decorator).build().fuse();
    let values = o!("version" => env!("CARGO_PKG_VERSION"));

    let logger = match cli.log_dir() {
        Some(dir) => {
            create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let path = dir.join(format!("{}.log", OffsetDateTime::now_utc().date()));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            let file_drain = slog_term::FullFormat::new(slog_term::PlainDecorator::new(file))
                .build()
                .fuse();
            let drain = slog::Duplicate::new(term, file_drain).fuse();
            let drain = slog_async::Async::new(drain).build().fuse();
            Logger::root(drain.filter_level(log_level).fuse(), values)
        }
        None => {
            let drain = slog_async::Async::new(term).build().fuse();
            Logger::root(drain.filter_level(log_level).fuse(), values)
        }
    };
    Ok(logger)
}
