//! Download settings and their TOML file representation.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT_JOBS, DEFAULT_SLOWDOWN_DELAY, MAX_CONCURRENT_JOBS,
    READ_TIMEOUT_SECS,
};
use crate::download::{DEFAULT_RETRY_BUDGET, DEFAULT_RETRY_DELAY, FailsafePolicy};

/// Directory name under the config home.
const CONFIG_DIR_NAME: &str = "tomefetch";

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`DownloadSettings`].
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    OutOfRange {
        /// Setting name.
        field: &'static str,
        /// Rejected value.
        value: u64,
        /// Accepted range, for display.
        expected: &'static str,
    },
}

/// Tunables of the download manager.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadSettings {
    /// Jobs allowed past the preparation phase at once.
    pub max_concurrent_jobs: usize,
    /// Transient failures retried before a job pauses.
    pub retry_budget: u32,
    /// Delay between transient retries, in milliseconds.
    pub retry_delay_ms: u64,
    /// Throttle after every page.
    pub slowdown: bool,
    /// Throttle duration, in milliseconds.
    pub slowdown_delay_ms: u64,
    /// HTTP connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP read timeout, in seconds.
    pub read_timeout_secs: u64,
    /// Archive output directory.
    pub output_dir: Option<PathBuf>,
    /// Page cache directory. No cache when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for DownloadSettings {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            retry_budget: DEFAULT_RETRY_BUDGET,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
            slowdown: false,
            slowdown_delay_ms: DEFAULT_SLOWDOWN_DELAY.as_millis() as u64,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
            output_dir: None,
            cache_dir: None,
        }
    }
}

impl DownloadSettings {
    /// Checks every value against its accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] for the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_range(
            "max_concurrent_jobs",
            self.max_concurrent_jobs as u64,
            1,
            MAX_CONCURRENT_JOBS as u64,
            "1..=16",
        )?;
        validate_range("retry_budget", u64::from(self.retry_budget), 0, 100, "0..=100")?;
        validate_range("retry_delay_ms", self.retry_delay_ms, 0, 60_000, "0..=60000")?;
        validate_range("slowdown_delay_ms", self.slowdown_delay_ms, 0, 60_000, "0..=60000")?;
        validate_range(
            "connect_timeout_secs",
            self.connect_timeout_secs,
            1,
            3600,
            "1..=3600",
        )?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1, 3600, "1..=3600")?;
        Ok(())
    }

    /// Retry policy derived from the budget and delay.
    #[must_use]
    pub fn failsafe_policy(&self) -> FailsafePolicy {
        FailsafePolicy::new(self.retry_budget, Duration::from_millis(self.retry_delay_ms))
    }

    /// Per-page throttle, when enabled.
    #[must_use]
    pub fn slowdown_delay(&self) -> Option<Duration> {
        self.slowdown
            .then(|| Duration::from_millis(self.slowdown_delay_ms))
    }

    /// Parses settings from TOML text; missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML or unknown keys, and
    /// [`ConfigError::OutOfRange`] for invalid values.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Loads settings from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or is invalid.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Loads settings from the default config path, or defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an existing file cannot be read or is invalid.
    pub fn load_default() -> Result<Self, ConfigError> {
        match resolve_default_config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading config file");
                Self::load_from(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

fn validate_range(
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            expected,
        })
    }
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/tomefetch/config.toml`
/// 2. `$HOME/.config/tomefetch/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults() {
        let settings = DownloadSettings::default();
        assert_eq!(settings.max_concurrent_jobs, 2);
        assert_eq!(settings.retry_budget, 2);
        assert_eq!(settings.retry_delay_ms, 500);
        assert!(!settings.slowdown);
        assert_eq!(settings.slowdown_delay_ms, 200);
        assert_eq!(settings.slowdown_delay(), None);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = DownloadSettings::from_toml_str(
            "max_concurrent_jobs = 4\nslowdown = true\noutput_dir = \"/data/books\"\n",
            Path::new("config.toml"),
        )
        .unwrap();
        assert_eq!(settings.max_concurrent_jobs, 4);
        assert_eq!(settings.slowdown_delay(), Some(Duration::from_millis(200)));
        assert_eq!(settings.output_dir, Some(PathBuf::from("/data/books")));
        assert_eq!(settings.retry_budget, 2);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = DownloadSettings::from_toml_str("concurrency = 3\n", Path::new("c.toml"));
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let result = DownloadSettings::from_toml_str("max_concurrent_jobs = 0\n", Path::new("c"));
        let error = result.unwrap_err();
        assert!(matches!(
            error,
            ConfigError::OutOfRange {
                field: "max_concurrent_jobs",
                ..
            }
        ));
        assert_eq!(
            error.to_string(),
            "invalid config value for `max_concurrent_jobs`: 0. Expected range: 1..=16"
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "retry_budget = 5\nretry_delay_ms = 50\n").unwrap();
        let settings = DownloadSettings::load_from(&path).unwrap();
        let policy = settings.failsafe_policy();
        assert_eq!(policy.budget(), 5);
        assert_eq!(policy.delay(), Duration::from_millis(50));
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = TempDir::new().unwrap();
        let result = DownloadSettings::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
