//! Watch event handlers that turn changes into batches

use super::{Change, application_batch, resource_batch};
use crate::error::Result;
use crate::model::{AppResourceInfo, ResourceInfo};
use crate::watcher::{ClusterWatcher, EventHandler, ResourceEvent, ResourceWatcher};
use async_trait::async_trait;
use kube::core::DynamicObject;

/// Convert a watch event into a change, using the freshest cached snapshot.
///
/// The cache may be ahead of the event; an object that vanished from it in
/// the meantime is treated as deleted.
fn latest_change(watcher: &ResourceWatcher, event: ResourceEvent) -> Change<DynamicObject> {
    match event {
        ResourceEvent::Deleted { object, .. } => Change::Deleted(object),
        ResourceEvent::Added { key, object } => match watcher.get_by_key(&key) {
            Some(current) => Change::Added(current),
            None => Change::Deleted(object),
        },
        ResourceEvent::Updated { key, old, new } => match watcher.get_by_key(&key) {
            Some(current) => Change::Updated { old, new: current },
            None => Change::Deleted(new),
        },
    }
}

/// Handler for every kind other than the application kind
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceBatchHandler;

#[async_trait]
impl EventHandler for ResourceBatchHandler {
    async fn handle(
        &self,
        cluster: &ClusterWatcher,
        watcher: &ResourceWatcher,
        event: ResourceEvent,
    ) -> Result<()> {
        let kind = watcher.kind();
        let change =
            latest_change(watcher, event).try_map(|obj| ResourceInfo::from_object(kind, &obj))?;

        let applications = cluster.application_snapshot();
        let batch = resource_batch(&cluster.resolver(&applications), change);
        cluster.batches().send(batch).await
    }
}

/// Handler for the application kind.
///
/// Besides batching the application and its ancestors, an added or updated
/// application gets watches for its declared component kinds.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationBatchHandler;

#[async_trait]
impl EventHandler for ApplicationBatchHandler {
    async fn handle(
        &self,
        cluster: &ClusterWatcher,
        watcher: &ResourceWatcher,
        event: ResourceEvent,
    ) -> Result<()> {
        let kind = watcher.kind();
        let change = latest_change(watcher, event);

        if let Change::Added(obj) | Change::Updated { new: obj, .. } = &change {
            let app = AppResourceInfo::from_object(kind, obj, cluster.namespaces_annotation())?;
            cluster.watch_application_components(&app).await?;
        }

        let change = change.try_map(|obj| ResourceInfo::from_object(kind, &obj))?;
        let applications = cluster.application_snapshot();
        let batch = application_batch(&cluster.resolver(&applications), change);
        cluster.batches().send(batch).await
    }
}
