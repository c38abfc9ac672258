//! Tableau stage binary
//!
//! Replays a scripted group chat session against the stage runtime and
//! prints every render command to stdout as one JSON object per line. Logs
//! go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tableau_stage::assets::{AssetResolver, HttpAssetResolver, StaticAssetResolver};
use tableau_stage::config::Config;
use tableau_stage::host::MemoryHost;
use tableau_stage::renderer::JsonLinesRenderer;
use tableau_stage::script::{load_script, run_script};
use tableau_stage::settings::{JsonFileStore, SettingsStore};
use tableau_stage::Stage;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    info!("Starting tableau stage");

    let settings_path = config.settings_path()?;
    let store = Arc::new(JsonFileStore::new(settings_path));
    let settings = store
        .load()
        .await
        .with_context(|| format!("Failed to load settings from {:?}", store.path()))?;
    info!(
        settings_path = %store.path().display(),
        asset_base_url = config.asset_base_url.as_deref().unwrap_or("-"),
        "Configuration loaded"
    );

    let assets: Arc<dyn AssetResolver> = match &config.asset_base_url {
        Some(url) => Arc::new(HttpAssetResolver::new(url).context("Invalid asset base url")?),
        None => Arc::new(StaticAssetResolver::empty()),
    };

    let steps = load_script(&config.script)
        .await
        .with_context(|| format!("Failed to load script {:?}", config.script))?;

    let host = Arc::new(MemoryHost::new());
    let renderer = Arc::new(JsonLinesRenderer::new(std::io::stdout()));
    let mut builder = Stage::builder(host.clone(), renderer)
        .assets(assets)
        .store(store)
        .settings(settings);
    if let Some(seed) = config.seed {
        builder = builder.seed(seed);
    }
    let stage = builder.build();

    run_script(&stage, &host, steps).await?;
    stage.end().await;

    info!("Script complete");
    Ok(())
}
