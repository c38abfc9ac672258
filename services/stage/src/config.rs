//! Process configuration for the stage binary.

use std::path::PathBuf;

use clap::Parser;

use crate::error::SettingsError;
use crate::settings::default_settings_path;

/// Replay a scripted group chat session and print stage effects as JSON lines.
#[derive(Debug, Clone, Parser)]
#[command(name = "stage")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Script to replay (JSON array of steps).
    pub script: PathBuf,

    /// Settings file. Defaults to `settings.json` in the platform config dir.
    #[arg(long, env = "TABLEAU_SETTINGS_FILE")]
    pub settings: Option<PathBuf>,

    /// Base URL of the portrait server. Without it no portraits are probed.
    #[arg(long, env = "TABLEAU_ASSET_BASE_URL")]
    pub asset_base_url: Option<String>,

    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset.
    #[arg(long, env = "TABLEAU_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Seed for the eviction side choice.
    #[arg(long, env = "TABLEAU_SEED")]
    pub seed: Option<u64>,
}

impl Config {
    /// Settings file to use.
    pub fn settings_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.settings {
            Some(path) => Ok(path.clone()),
            None => default_settings_path(),
        }
    }
}
