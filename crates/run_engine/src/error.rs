use std::path::PathBuf;

use stream_protocol::{Channel, RunId};
use thiserror::Error;

use crate::export::ExportFormat;

/// A single `output` line that could not be parsed. Never fatal to ingestion.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to parse output line {line_index}: {source}")]
    Parse {
        line_index: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl IngestError {
    #[must_use]
    pub fn line_index(&self) -> usize {
        match self {
            Self::Parse { line_index, .. } => *line_index,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LaunchError {
    #[error("an execution is already running")]
    AlreadyRunning,

    #[error("project path must not be empty")]
    EmptyProjectPath,

    #[error("task must not be empty")]
    EmptyTask,

    #[error("{0}")]
    UnsupportedModel(String),

    #[error("Failed to execute agent: {0}")]
    Backend(String),

    #[error("failed to subscribe to {channel} for run {run_id}: {message}")]
    Subscribe {
        run_id: RunId,
        channel: Channel,
        message: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExportError {
    #[error("failed to copy {format} export to clipboard: {message}")]
    Clipboard {
        format: ExportFormat,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    #[must_use]
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
