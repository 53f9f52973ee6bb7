//! Engine tuning knobs.
//!
//! Sources, later overriding earlier: built-in defaults, the optional JSON file
//! named by `RUN_ENGINE_CONFIG_PATH`, then the individual `RUN_ENGINE_*`
//! overrides. Blank environment values are ignored.

use std::path::{Path, PathBuf};
use std::time::Duration;

use runview::ViewportOptions;
use serde::Deserialize;

use crate::error::ConfigError;

pub const CONFIG_PATH_ENV_VAR: &str = "RUN_ENGINE_CONFIG_PATH";
pub const OVERSCAN_ENV_VAR: &str = "RUN_ENGINE_OVERSCAN";
pub const ROW_ESTIMATE_ENV_VAR: &str = "RUN_ENGINE_ROW_ESTIMATE";
pub const TICK_MS_ENV_VAR: &str = "RUN_ENGINE_TICK_MS";
pub const WIDTH_ENV_VAR: &str = "RUN_ENGINE_WIDTH";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows assumed for a transcript entry before it is first rendered.
    pub estimated_row_height: u32,
    pub overscan: usize,
    /// Elapsed-time sampling cadence while a run is active.
    pub tick_interval: Duration,
    pub bottom_tolerance: u32,
    /// Column width transcript rows are wrapped to.
    pub transcript_width: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            estimated_row_height: 6,
            overscan: 5,
            tick_interval: Duration::from_millis(100),
            bottom_tolerance: 1,
            transcript_width: 100,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    estimated_row_height: Option<u32>,
    overscan: Option<usize>,
    tick_interval_ms: Option<u64>,
    bottom_tolerance: Option<u32>,
    transcript_width: Option<usize>,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves configuration through `lookup` instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = non_blank(lookup(CONFIG_PATH_ENV_VAR)) {
            config = config.merge_file(&PathBuf::from(path))?;
        }

        if let Some(value) = non_blank(lookup(OVERSCAN_ENV_VAR)) {
            config.overscan = parse_value(OVERSCAN_ENV_VAR, &value)?;
        }
        if let Some(value) = non_blank(lookup(ROW_ESTIMATE_ENV_VAR)) {
            config.estimated_row_height = positive(ROW_ESTIMATE_ENV_VAR, parse_value(ROW_ESTIMATE_ENV_VAR, &value)?)?;
        }
        if let Some(value) = non_blank(lookup(TICK_MS_ENV_VAR)) {
            let millis: u64 = positive(TICK_MS_ENV_VAR, parse_value(TICK_MS_ENV_VAR, &value)?)?;
            config.tick_interval = Duration::from_millis(millis);
        }
        if let Some(value) = non_blank(lookup(WIDTH_ENV_VAR)) {
            config.transcript_width = positive(WIDTH_ENV_VAR, parse_value(WIDTH_ENV_VAR, &value)?)?;
        }

        Ok(config)
    }

    /// Applies the fields present in the JSON file at `path`.
    pub fn merge_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(value) = file.estimated_row_height {
            self.estimated_row_height = positive("estimated_row_height", value)?;
        }
        if let Some(value) = file.overscan {
            self.overscan = value;
        }
        if let Some(value) = file.tick_interval_ms {
            self.tick_interval = Duration::from_millis(positive("tick_interval_ms", value)?);
        }
        if let Some(value) = file.bottom_tolerance {
            self.bottom_tolerance = positive("bottom_tolerance", value)?;
        }
        if let Some(value) = file.transcript_width {
            self.transcript_width = positive("transcript_width", value)?;
        }

        Ok(self)
    }

    #[must_use]
    pub fn viewport_options(&self) -> ViewportOptions {
        ViewportOptions {
            estimated_row_height: self.estimated_row_height,
            overscan: self.overscan,
            bottom_tolerance: self.bottom_tolerance,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|error: T::Err| ConfigError::invalid(key, format!("'{value}': {error}")))
}

fn positive<T>(key: &str, value: T) -> Result<T, ConfigError>
where
    T: Default + PartialOrd + std::fmt::Display,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::invalid(key, format!("must be > 0, got {value}")))
    }
}
