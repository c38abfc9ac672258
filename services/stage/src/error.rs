//! Error types for the stage runtime.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or saving [`StageSettings`](crate::settings::StageSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not determine a config directory for this platform")]
    NoConfigDir,

    #[error("failed to read settings from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Errors from the portrait asset resolver.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("invalid asset base url {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Errors reported by a host adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("group not found: {0}")]
    GroupNotFound(String),
}

/// Top-level error for stage operations that can fail.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error("invalid script: {0}")]
    Script(String),
}
