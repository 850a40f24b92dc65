//! appnav-controller - tracks application components in a Kubernetes cluster
//!
//! Starts watching applications, follows their component kinds as they are
//! declared and logs which application statuses need recomputation.

mod cli;

use anyhow::{Context, Result};
use appnav_controller::batch::{BatchProcessor, batch_queue};
use appnav_controller::config::ConfigLoader;
use appnav_controller::kube::{KubeClusterClient, create_client};
use appnav_controller::status::LoggingStatusCallback;
use appnav_controller::watcher::ClusterWatcher;
use clap::Parser;
use cli::Args;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    cli::init_logging(args.debug, args.log_file.as_deref())?;

    let mut config =
        ConfigLoader::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_to(&mut config);
    ConfigLoader::validate(&config)?;
    if config.namespaces.is_empty() {
        tracing::info!("watching all namespaces");
    } else {
        tracing::info!("watching namespaces: {}", config.namespaces.join(", "));
    }

    let client = create_client(args.context.as_deref()).await?;
    let client = Arc::new(KubeClusterClient::new(client));

    let (batches, receiver) = batch_queue(config.queue_capacity);
    let cluster = ClusterWatcher::new(client, &config, batches);
    cluster
        .start()
        .await
        .context("Failed to start application watch")?;

    let processor = BatchProcessor::new(receiver, config.batch_duration(), LoggingStatusCallback);
    tokio::select! {
        _ = processor.run() => {
            tracing::warn!("batch processor stopped");
        }
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("shutting down");
        }
    }

    cluster.stop();
    Ok(())
}
