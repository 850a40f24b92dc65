//! Kubernetes client module
//!
//! Builds the configured [`Client`] and wraps it behind [`ClusterClient`],
//! the narrow interface the watcher needs from the API server: discovery,
//! watches, reads and deletes of arbitrary kinds.

mod client;

pub use client::*;

use ::kube::config::KubeConfigOptions;
use ::kube::{Client, Config};
use anyhow::{Context, Result};

/// Initialize and return a Kubernetes client
///
/// Without a context the default loading strategy is used:
/// 1. In-cluster config (if running in a pod)
/// 2. KUBECONFIG environment variable
/// 3. ~/.kube/config
///
/// A named context is always read from the kubeconfig file.
pub async fn create_client(context: Option<&str>) -> Result<Client> {
    let config = match context {
        Some(context) => {
            let options = KubeConfigOptions {
                context: Some(context.to_string()),
                ..KubeConfigOptions::default()
            };
            Config::from_kubeconfig(&options)
                .await
                .with_context(|| format!("Failed to load kubeconfig context '{}'", context))?
        }
        None => Config::infer()
            .await
            .context("Failed to infer Kubernetes configuration")?,
    };

    tracing::info!("connecting to {}", config.cluster_url);
    let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
    Ok(client)
}
