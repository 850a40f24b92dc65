//! Event batching
//!
//! Every processed watch event becomes a [`Batch`]: the applications whose
//! status must be recomputed plus the non-application resources that
//! changed. Batches travel over a bounded queue to the [`BatchProcessor`],
//! which coalesces everything received within one window before calling
//! the status callback.

mod builder;
mod handler;
mod processor;

pub use builder::*;
pub use handler::*;
pub use processor::*;

use crate::error::{Error, Result};
use crate::model::{ResourceInfo, ResourceKey};
use crate::resolver::FoundApplications;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// Resources affected by one or more events, keyed by identity
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub applications: BTreeMap<ResourceKey, ResourceInfo>,
    pub non_applications: BTreeMap<ResourceKey, ResourceInfo>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty() && self.non_applications.is_empty()
    }

    /// Record applications found by an ancestor walk
    pub fn add_applications(&mut self, found: FoundApplications) {
        self.applications.extend(found);
    }

    pub fn add_resource(&mut self, resource: ResourceInfo) {
        self.non_applications.insert(resource.key(), resource);
    }

    /// Fold `other` into this batch; later snapshots win on equal keys
    pub fn merge(&mut self, other: Batch) {
        self.applications.extend(other.applications);
        self.non_applications.extend(other.non_applications);
    }
}

/// Producer side of the batch queue
///
/// Sending waits when the queue is full, so slow status computation stalls
/// the watch loops instead of dropping work.
#[derive(Debug, Clone)]
pub struct BatchSender {
    tx: mpsc::Sender<Batch>,
}

impl BatchSender {
    /// Enqueue a batch. Empty batches are dropped here.
    pub async fn send(&self, batch: Batch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            "sending {} applications and {} resources on batch queue",
            batch.applications.len(),
            batch.non_applications.len()
        );
        self.tx.send(batch).await.map_err(|_| Error::QueueClosed)
    }
}

/// Create the bounded batch queue
pub fn batch_queue(capacity: usize) -> (BatchSender, mpsc::Receiver<Batch>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (BatchSender { tx }, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GroupVersionResource;

    fn info(name: &str, replicas: i64) -> ResourceInfo {
        ResourceInfo {
            gvr: GroupVersionResource::new("apps", "v1", "deployments"),
            kind: "Deployment".to_string(),
            namespace: "default".to_string(),
            name: name.to_string(),
            labels: None,
            metadata: serde_json::json!({ "replicas": replicas }),
        }
    }

    #[test]
    fn test_merge_deduplicates_by_key() {
        let mut first = Batch::default();
        first.add_resource(info("a", 1));
        let mut second = Batch::default();
        second.add_resource(info("a", 2));
        second.add_resource(info("b", 1));

        first.merge(second);
        assert_eq!(first.non_applications.len(), 2);
        let a = &first.non_applications[&info("a", 0).key()];
        assert_eq!(a.metadata["replicas"], 2);
    }

    #[tokio::test]
    async fn test_empty_batches_are_not_queued() {
        let (sender, mut rx) = batch_queue(4);
        sender.send(Batch::default()).await.unwrap();
        let mut batch = Batch::default();
        batch.add_resource(info("a", 1));
        sender.send(batch.clone()).await.unwrap();
        drop(sender);

        assert_eq!(rx.recv().await, Some(batch));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (sender, rx) = batch_queue(1);
        drop(rx);
        let mut batch = Batch::default();
        batch.add_resource(info("a", 1));
        assert!(matches!(sender.send(batch).await, Err(Error::QueueClosed)));
    }
}
