//! Locating and reading the pipeline's TOML file.
//!
//! A setting given on the command line beats the same setting read from the
//! environment, which beats the file. Whatever is left unset falls back to the
//! built-in defaults. Merging happens in the binary; this module only decides
//! which file to read, if any.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::APP_NAME;

/// The file a configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Named by `--config` or the config env var.
    Explicit(PathBuf),
    /// Next to the working directory.
    CurrentDir(PathBuf),
    /// Under the per-user config directory.
    XdgConfig(PathBuf),
    /// Under `/etc/weather-etl/`.
    System(PathBuf),
    /// Nothing on disk.
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConfigSource::Explicit(p)
            | ConfigSource::CurrentDir(p)
            | ConfigSource::XdgConfig(p)
            | ConfigSource::System(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path() {
            Some(p) => write!(f, "{}", p.display()),
            None => write!(f, "(defaults)"),
        }
    }
}

/// Returns the first candidate that exists on disk, or `Defaults`.
///
/// Candidates are tried as: the path in `env_var`, `filename` in the working
/// directory, `filename` in the user's config directory, and finally
/// `/etc/weather-etl/filename`. A path in `env_var` that does not exist is
/// ignored rather than treated as an error.
pub fn find_config_file(env_var: &str, filename: &str) -> ConfigSource {
    let mut candidates = Vec::with_capacity(4);
    if let Some(path) = env::var_os(env_var) {
        candidates.push(ConfigSource::Explicit(PathBuf::from(path)));
    }
    candidates.push(ConfigSource::CurrentDir(PathBuf::from(filename)));
    if let Some(dir) = user_config_dir() {
        candidates.push(ConfigSource::XdgConfig(dir.join(filename)));
    }
    candidates.push(ConfigSource::System(
        PathBuf::from("/etc").join(APP_NAME).join(filename),
    ));

    candidates
        .into_iter()
        .find(|candidate| candidate.path().is_some_and(|p| p.exists()))
        .unwrap_or(ConfigSource::Defaults)
}

/// `$XDG_CONFIG_HOME/weather-etl`, or `$HOME/.config/weather-etl` when the
/// former is unset or empty. `None` without either variable.
fn user_config_dir() -> Option<PathBuf> {
    let base = env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    Some(base.join(APP_NAME))
}

/// Parses the file behind `source`, or hands back `T::default()` for
/// [`ConfigSource::Defaults`]. Read and parse failures name the file.
pub fn load_config<T: DeserializeOwned + Default>(source: &ConfigSource) -> anyhow::Result<T> {
    match source.path() {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            let config: T = toml::from_str(&content)
                .with_context(|| format!("failed to parse config {}", path.display()))?;
            Ok(config)
        }
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Deserialize, Default, Debug, PartialEq)]
    struct Sample {
        raw_dir: Option<String>,
        once: Option<bool>,
    }

    #[test]
    fn test_config_source_display() {
        let source = ConfigSource::CurrentDir(PathBuf::from("pipeline.toml"));
        assert_eq!(format!("{}", source), "pipeline.toml");

        let source = ConfigSource::Defaults;
        assert_eq!(format!("{}", source), "(defaults)");
    }

    #[test]
    fn test_load_config_defaults_without_file() {
        let config: Sample = load_config(&ConfigSource::Defaults).unwrap();
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn test_load_config_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "raw_dir = \"/tmp/raw\"\nonce = true").unwrap();

        let source = ConfigSource::Explicit(file.path().to_path_buf());
        let config: Sample = load_config(&source).unwrap();
        assert_eq!(config.raw_dir.as_deref(), Some("/tmp/raw"));
        assert_eq!(config.once, Some(true));
    }

    #[test]
    fn test_find_config_file_prefers_env_var() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "once = true").unwrap();
        env::set_var("WEATHER_ETL_CORE_TEST_CONFIG", file.path());

        let source = find_config_file("WEATHER_ETL_CORE_TEST_CONFIG", "missing-pipeline.toml");
        assert_eq!(source, ConfigSource::Explicit(file.path().to_path_buf()));
    }

    #[test]
    fn test_find_config_file_skips_missing_env_path() {
        env::set_var(
            "WEATHER_ETL_CORE_TEST_MISSING",
            "/nonexistent/weather-etl/pipeline.toml",
        );

        let source = find_config_file(
            "WEATHER_ETL_CORE_TEST_MISSING",
            "weather-etl-core-test-missing.toml",
        );
        assert_eq!(source, ConfigSource::Defaults);
    }

    #[test]
    fn test_load_config_reports_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "raw_dir = [").unwrap();

        let source = ConfigSource::Explicit(file.path().to_path_buf());
        let result: anyhow::Result<Sample> = load_config(&source);
        assert!(result.is_err());
    }
}
