//! Status callback contract
//!
//! Status computation itself lives outside the controller core. After each
//! batch window the [`BatchProcessor`](crate::batch::BatchProcessor) calls
//! the callback once per surviving key.

use crate::model::{ResourceInfo, ResourceKey};
use async_trait::async_trait;

#[async_trait]
pub trait StatusCallback: Send + Sync {
    /// Recompute the status of one application
    async fn calculate_status(&self, key: &ResourceKey, application: &ResourceInfo);

    /// A non-application resource changed. Called before the applications of
    /// the same window.
    async fn component_changed(&self, _key: &ResourceKey, _resource: &ResourceInfo) {}
}

/// Callback that only logs what would be recomputed
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStatusCallback;

#[async_trait]
impl StatusCallback for LoggingStatusCallback {
    async fn calculate_status(&self, key: &ResourceKey, application: &ResourceInfo) {
        tracing::info!("recompute status of {} ({})", key, application.kind);
    }

    async fn component_changed(&self, key: &ResourceKey, resource: &ResourceInfo) {
        tracing::debug!("component {} ({}) changed", key, resource.kind);
    }
}
