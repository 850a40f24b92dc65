//! Batch queue consumer

use super::Batch;
use crate::status::StatusCallback;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout_at};

/// Coalesces queued batches over a fixed window and dispatches the result.
///
/// The window opens when the first batch arrives. Everything received until
/// it closes is merged by key, so a burst of events for one application
/// produces a single status computation.
pub struct BatchProcessor<C> {
    receiver: mpsc::Receiver<Batch>,
    window: Duration,
    callback: C,
}

impl<C: StatusCallback> BatchProcessor<C> {
    pub fn new(receiver: mpsc::Receiver<Batch>, window: Duration, callback: C) -> Self {
        Self {
            receiver,
            window,
            callback,
        }
    }

    /// Process batches until every sender is dropped
    pub async fn run(mut self) {
        while let Some(first) = self.receiver.recv().await {
            let (batch, closed) = self.collect(first).await;
            self.dispatch(batch).await;
            if closed {
                break;
            }
        }
        tracing::info!("batch queue closed, processor exiting");
    }

    /// Merge batches arriving within one window. Also reports whether the
    /// queue closed while collecting.
    async fn collect(&mut self, first: Batch) -> (Batch, bool) {
        let mut pending = first;
        let deadline = Instant::now() + self.window;
        loop {
            match timeout_at(deadline, self.receiver.recv()).await {
                Ok(Some(batch)) => pending.merge(batch),
                Ok(None) => return (pending, true),
                Err(_) => return (pending, false),
            }
        }
    }

    async fn dispatch(&self, batch: Batch) {
        tracing::debug!(
            "dispatching {} applications and {} resources",
            batch.applications.len(),
            batch.non_applications.len()
        );
        for (key, resource) in &batch.non_applications {
            self.callback.component_changed(key, resource).await;
        }
        for (key, application) in &batch.applications {
            self.callback.calculate_status(key, application).await;
        }
    }
}
