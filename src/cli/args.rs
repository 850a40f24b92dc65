//! Command line arguments

use appnav_controller::config::ControllerConfig;
use clap::Parser;
use std::path::PathBuf;

/// Watches applications and their components and batches status recomputation
#[derive(Parser, Debug)]
#[command(name = "appnav-controller", version)]
#[command(about = "Tracks application components and batches status recomputation", long_about = None)]
pub struct Args {
    /// Configuration file (defaults to <config dir>/config.yaml when present)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Kubeconfig context to use instead of the inferred one
    #[arg(long)]
    pub context: Option<String>,

    /// Namespace to watch; repeat for several. Overrides the config file.
    #[arg(long = "namespace", short = 'n')]
    pub namespaces: Vec<String>,

    /// Batch coalescing window in milliseconds
    #[arg(long)]
    pub batch_duration_ms: Option<u64>,

    /// Enable debug logging
    #[arg(long, short = 'd')]
    pub debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Args {
    /// Apply flag overrides on top of the loaded configuration
    pub fn apply_to(&self, config: &mut ControllerConfig) {
        if !self.namespaces.is_empty() {
            config.namespaces = self.namespaces.clone();
        }
        if let Some(duration) = self.batch_duration_ms {
            config.batch_duration_ms = duration;
        }
    }
}
