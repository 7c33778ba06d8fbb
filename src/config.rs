use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_FILE_ENV: &str = "KENUTS_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride { key: &'static str, value: String },

    #[error("max_header_lines must be greater than zero")]
    ZeroHeaderLines,
}

/// Server configuration.
///
/// Resolved once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub max_header_lines: usize,
    pub index_file: PathBuf,
    pub shutdown_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:6969".to_string(),
            read_timeout_ms: 5_000,
            write_timeout_ms: 5_000,
            max_header_lines: 200,
            index_file: Path::new(".").join("index.html"),
            shutdown_timeout_ms: 5_000,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// Defaults are overlaid by the YAML file named in `KENUTS_CONFIG`
    /// (if set), then by the individual `KENUTS_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same resolution as [`Config::load`], reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup(CONFIG_FILE_ENV) {
            Some(path) => Self::from_yaml_file(Path::new(&path))?,
            None => Self::default(),
        };

        if let Some(v) = lookup("KENUTS_LISTEN") {
            cfg.listen_addr = v;
        }
        if let Some(v) = lookup("KENUTS_READ_TIMEOUT_MS") {
            cfg.read_timeout_ms = parse_override("KENUTS_READ_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("KENUTS_WRITE_TIMEOUT_MS") {
            cfg.write_timeout_ms = parse_override("KENUTS_WRITE_TIMEOUT_MS", v)?;
        }
        if let Some(v) = lookup("KENUTS_MAX_HEADER_LINES") {
            cfg.max_header_lines = parse_override("KENUTS_MAX_HEADER_LINES", v)?;
        }
        if let Some(v) = lookup("KENUTS_INDEX_FILE") {
            cfg.index_file = PathBuf::from(v);
        }
        if let Some(v) = lookup("KENUTS_SHUTDOWN_TIMEOUT_MS") {
            cfg.shutdown_timeout_ms = parse_override("KENUTS_SHUTDOWN_TIMEOUT_MS", v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads a YAML config file. Missing fields keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_header_lines == 0 {
            return Err(ConfigError::ZeroHeaderLines);
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

fn parse_override<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride { key, value })
}
