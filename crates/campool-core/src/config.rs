//! Configuration loading and typed config structures for Campool.
//!
//! The canonical configuration lives in `campool-config.yaml` at the
//! project root. Every section and field is optional; missing values fall
//! back to the reference timing of the campus demo (200 ms ticks, 1.2% of
//! the route per tick, pools of four).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::campus;
use crate::fixture::{Fixture, FixtureError};
use crate::grouping::GroupingRuleKind;

/// Environment variable that overrides `simulation.fixture`.
pub const FIXTURE_ENV: &str = "CAMPOOL_FIXTURE";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configured fixture could not be loaded.
    #[error("failed to load fixture: {source}")]
    Fixture {
        /// The underlying fixture error.
        #[from]
        source: FixtureError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level Campool configuration.
///
/// Mirrors the structure of `campool-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CampoolConfig {
    /// Scenario selection and seeding.
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Trip progress driver timing.
    #[serde(default)]
    pub motion: MotionConfig,

    /// Pool grouping parameters.
    #[serde(default)]
    pub pooling: PoolingConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CampoolConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `CAMPOOL_FIXTURE` overrides `simulation.fixture` when set and clears
    /// `simulation.fixture_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.simulation.apply_env_overrides();
        Ok(config)
    }

    /// Load the fixture this configuration selects.
    ///
    /// `simulation.fixture_path` wins over `simulation.fixture`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Fixture`] if the file cannot be loaded or the
    /// built-in name is unknown.
    pub fn load_fixture(&self) -> Result<Fixture, ConfigError> {
        let fixture = match &self.simulation.fixture_path {
            Some(path) => Fixture::from_file(path)?,
            None => campus::builtin(&self.simulation.fixture)?,
        };
        Ok(fixture)
    }
}

/// Scenario selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Human-readable simulation name.
    #[serde(default = "default_simulation_name")]
    pub name: String,

    /// Seed for generated verification codes.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Built-in fixture name.
    #[serde(default = "default_fixture")]
    pub fixture: String,

    /// YAML fixture file; overrides `fixture` when set.
    #[serde(default)]
    pub fixture_path: Option<PathBuf>,
}

impl SimulationConfig {
    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.override_fixture(std::env::var(FIXTURE_ENV).ok());
    }

    /// Select a built-in fixture by name, dropping any `fixture_path` so the
    /// override is the one loaded. `None` leaves the selection unchanged.
    pub fn override_fixture(&mut self, name: Option<String>) {
        if let Some(name) = name {
            self.fixture = name;
            self.fixture_path = None;
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            name: default_simulation_name(),
            seed: default_seed(),
            fixture: default_fixture(),
            fixture_path: None,
        }
    }
}

/// Trip progress driver timing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MotionConfig {
    /// Milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Fraction of the route each trip covers per tick. Must be positive.
    #[serde(default = "default_progress_per_tick")]
    pub progress_per_tick: f64,

    /// How long finished trips are held at full progress before completion.
    #[serde(default = "default_completion_hold_ms")]
    pub completion_hold_ms: u64,
}

impl MotionConfig {
    /// Tick interval as a [`Duration`].
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Completion hold as a [`Duration`].
    pub const fn completion_hold(&self) -> Duration {
        Duration::from_millis(self.completion_hold_ms)
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            progress_per_tick: default_progress_per_tick(),
            completion_hold_ms: default_completion_hold_ms(),
        }
    }
}

/// Pool grouping parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolingConfig {
    /// Riders per pool.
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Grouping rule.
    #[serde(default)]
    pub rule: GroupingRuleKind,
}

impl Default for PoolingConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            rule: GroupingRuleKind::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_simulation_name() -> String {
    "Campus Evening Rush".to_owned()
}

const fn default_seed() -> u64 {
    42
}

fn default_fixture() -> String {
    campus::EVENING_RUSH.to_owned()
}

const fn default_tick_interval_ms() -> u64 {
    200
}

const fn default_progress_per_tick() -> f64 {
    0.012
}

const fn default_completion_hold_ms() -> u64 {
    200
}

const fn default_capacity() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_owned()
}
