mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use tickertape_core::config::load_dotenv;
use tickertape_core::{SinkConfig, SystemClock};
use tickertape_pipeline::{Aggregator, Pipeline};
use tickertape_watcher::{spawn_watchers, NomadClient, NomadConfig, WatchOptions};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = CliArgs::parse();
    logging::init(args.debug, args.log_file.as_deref())?;

    info!("tickertape v{}", env!("CARGO_PKG_VERSION"));

    let config = args.sink_config(SinkConfig::from_env().context("invalid TICKERTAPE_* environment")?);
    config.validate().context("invalid sink configuration")?;
    config.log_summary();

    let nomad = NomadConfig::from_env();
    nomad.log_summary();
    let options = WatchOptions::default();
    let client = NomadClient::new(nomad, options.wait).context("failed to create Nomad client")?;

    // The sink opens before the watchers' first listing is consumed.
    let watch = spawn_watchers(Arc::new(client), options);
    let pipeline = Pipeline::start(&config, Arc::new(SystemClock), Aggregator::from_watch(watch))
        .await
        .context("failed to start event pipeline")?;

    let stats = pipeline
        .run_until(shutdown_signal())
        .await
        .context("event pipeline stopped on a fatal error")?;

    if let Ok(json) = serde_json::to_string(&stats) {
        debug!(stats = %json, "final stats");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c; running until the watchers stop");
        std::future::pending::<()>().await;
    }
}
