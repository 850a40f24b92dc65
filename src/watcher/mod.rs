//! Watcher module
//!
//! Provides dynamic watches over an open-ended set of resource kinds. Each
//! kind gets its own [`ResourceWatcher`] with a local cache; the
//! [`ClusterWatcher`] owns them and starts new ones as applications declare
//! new component kinds.

mod cluster;
mod namespace_filter;
mod resource_watcher;

pub use cluster::*;
pub use namespace_filter::*;
pub use resource_watcher::*;

use crate::error::Result;
use async_trait::async_trait;
use kube::core::DynamicObject;

/// Kind of change carried by a [`ResourceEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Add,
    Update,
    Delete,
}

/// Normalized change notification for one object of a watched kind
#[derive(Debug, Clone)]
pub enum ResourceEvent {
    /// Object seen for the first time (including the initial listing)
    Added { key: String, object: DynamicObject },
    /// Object changed; `old` is the previously cached snapshot
    Updated {
        key: String,
        old: DynamicObject,
        new: DynamicObject,
    },
    /// Object removed; `object` is its last known state
    Deleted { key: String, object: DynamicObject },
}

impl ResourceEvent {
    pub fn key(&self) -> &str {
        match self {
            ResourceEvent::Added { key, .. }
            | ResourceEvent::Updated { key, .. }
            | ResourceEvent::Deleted { key, .. } => key,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ResourceEvent::Added { .. } => EventKind::Add,
            ResourceEvent::Updated { .. } => EventKind::Update,
            ResourceEvent::Deleted { .. } => EventKind::Delete,
        }
    }
}

/// Callback invoked by a [`ResourceWatcher`] once per observed change,
/// after its cache reflects the change.
///
/// Errors are logged by the watcher and the event counts as processed.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        cluster: &ClusterWatcher,
        watcher: &ResourceWatcher,
        event: ResourceEvent,
    ) -> Result<()>;
}
