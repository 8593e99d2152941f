// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Service configuration.
//!
//! Settings are read from an optional TOML file and overlaid with
//! environment variables prefixed `BENCHWATCH__`, using `__` between
//! section and key (`BENCHWATCH__ANALYSIS__CHANGE_THRESHOLD=5`). Every
//! field has a default, so an empty configuration is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "BENCHWATCH";

/// Default configuration file name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "benchwatch.toml";

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub analysis: TrendConfig,
    pub ingest: IngestConfig,
    pub report: ReportPolicy,
    pub logging: LoggingConfig,
    pub commits: CommitsConfig,
}

impl Settings {
    /// Load settings from `path` (or [`DEFAULT_CONFIG_FILE`] if present) and
    /// the environment, then validate them.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        builder = match path {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE).required(false)),
        };

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.analysis.validate()?;
        self.report.validate()?;
        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://benchwatch.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Thresholds and windows for change detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Percent change beyond which a result is a regression or improvement.
    pub change_threshold: f64,
    /// Percent drift of the window itself that is worth flagging.
    pub trend_threshold: f64,
    /// Number of earlier results forming the baseline.
    pub trend_window: usize,
    /// Benchmarks per timeline page.
    pub timeline_page_size: usize,
    /// Default number of revisions per timeline series.
    pub timeline_limit: usize,
    /// Trend windows offered to changes-table clients.
    pub trend_choices: Vec<usize>,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            change_threshold: 3.0,
            trend_threshold: 4.0,
            trend_window: 10,
            timeline_page_size: 10,
            timeline_limit: 50,
            trend_choices: vec![5, 10, 20, 50, 100],
        }
    }
}

impl TrendConfig {
    /// Same thresholds with a different window.
    pub fn with_window(&self, trend_window: usize) -> Self {
        Self {
            trend_window,
            ..self.clone()
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.change_threshold.is_finite() && self.change_threshold >= 0.0) {
            return Err(Error::Config(format!(
                "analysis.change_threshold must be a non-negative number, got {}",
                self.change_threshold
            )));
        }
        if !(self.trend_threshold.is_finite() && self.trend_threshold >= 0.0) {
            return Err(Error::Config(format!(
                "analysis.trend_threshold must be a non-negative number, got {}",
                self.trend_threshold
            )));
        }
        if self.trend_window == 0 {
            return Err(Error::Config(
                "analysis.trend_window must be at least 1".to_string(),
            ));
        }
        if self.timeline_page_size == 0 {
            return Err(Error::Config(
                "analysis.timeline_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which dimensions ingestion may create on first sight.
///
/// Environments are never created implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub auto_create_projects: bool,
    pub auto_create_executables: bool,
    pub auto_create_benchmarks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            auto_create_projects: true,
            auto_create_executables: false,
            auto_create_benchmarks: true,
        }
    }
}

/// When enough results exist to materialise a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPolicy {
    /// Absolute minimum number of results for the key.
    pub min_results: usize,
    /// Fraction of the previous revision's result count that must be present.
    pub min_fraction: f64,
    /// Rows returned by report listings.
    pub listing_limit: usize,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        Self {
            min_results: 1,
            min_fraction: 1.0,
            listing_limit: 10,
        }
    }
}

impl ReportPolicy {
    /// Number of results required when the previous revision holds `known`.
    pub fn required(&self, known: usize) -> usize {
        let fraction = (self.min_fraction * known as f64).ceil() as usize;
        fraction.max(self.min_results)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.min_fraction) {
            return Err(Error::Config(format!(
                "report.min_fraction must be within [0, 1], got {}",
                self.min_fraction
            )));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Commit log lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitsConfig {
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub timeout_secs: u64,
}

impl Default for CommitsConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_url: "https://api.github.com".to_string(),
            timeout_secs: 10,
        }
    }
}
