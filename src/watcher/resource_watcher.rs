//! Watch and cache for a single resource kind
//!
//! One watch stream runs per scope (a namespace, or every namespace for
//! cluster-wide watches). All scopes of a kind feed one worker task, which
//! applies each event to the cache and then runs the handler before taking
//! the next event. Kinds are processed independently of each other.

use super::{ClusterWatcher, EventHandler, ResourceEvent};
use crate::error::{Error, Result};
use crate::kube::ClusterClient;
use crate::model::{KindDescriptor, object_key};
use futures::StreamExt;
use kube::core::DynamicObject;
use kube::runtime::watcher;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Events buffered between the watch streams and the worker of one kind
const WATCH_EVENT_BUFFER: usize = 128;

/// Pause after a failed poll of a watch stream
const WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Watch event tagged with the scope whose stream produced it
#[derive(Debug)]
pub(crate) struct ScopedEvent {
    scope: String,
    event: watcher::Event<DynamicObject>,
}

/// Keys re-announced per scope since the last `Init`
pub(crate) type Relists = HashMap<String, HashSet<String>>;

struct Inner {
    kind: KindDescriptor,
    cache: RwLock<HashMap<String, DynamicObject>>,
    scopes: Mutex<HashMap<String, JoinHandle<()>>>,
    events_tx: mpsc::Sender<ScopedEvent>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cached watch over one kind
#[derive(Clone)]
pub struct ResourceWatcher {
    inner: Arc<Inner>,
}

impl ResourceWatcher {
    /// Create the watcher and spawn its worker. No scope is watched yet.
    pub(crate) fn start(
        kind: KindDescriptor,
        handler: Arc<dyn EventHandler>,
        cluster: ClusterWatcher,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::WatchStart {
            kind: kind.to_string(),
            reason: e.to_string(),
        })?;

        let (events_tx, events_rx) = mpsc::channel(WATCH_EVENT_BUFFER);
        let watcher = Self::detached(kind, events_tx);
        let worker = runtime.spawn(run_worker(
            watcher.clone(),
            events_rx,
            handler,
            cluster,
        ));
        *watcher.inner.worker.lock() = Some(worker);

        tracing::info!("started watcher for {}", watcher.kind());
        Ok(watcher)
    }

    /// Watcher without a worker; events must be applied by the caller
    fn detached(kind: KindDescriptor, events_tx: mpsc::Sender<ScopedEvent>) -> Self {
        Self {
            inner: Arc::new(Inner {
                kind,
                cache: RwLock::new(HashMap::new()),
                scopes: Mutex::new(HashMap::new()),
                events_tx,
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn kind(&self) -> &KindDescriptor {
        &self.inner.kind
    }

    /// Start a watch stream for `scope` ("" means every namespace).
    ///
    /// Returns false when the scope is already watched.
    pub(crate) fn watch_scope(&self, scope: &str, client: &dyn ClusterClient) -> Result<bool> {
        let mut scopes = self.inner.scopes.lock();
        if scopes.contains_key(scope) {
            return Ok(false);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| Error::WatchStart {
            kind: self.kind().to_string(),
            reason: e.to_string(),
        })?;

        let stream = client.watch(self.kind(), scope);
        let handle = runtime.spawn(forward_events(
            self.kind().to_string(),
            scope.to_string(),
            stream,
            self.inner.events_tx.clone(),
        ));
        scopes.insert(scope.to_string(), handle);

        if scope.is_empty() {
            tracing::info!("watching {} in all namespaces", self.kind());
        } else {
            tracing::info!("watching {} in namespace {}", self.kind(), scope);
        }
        Ok(true)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.inner.scopes.lock().contains_key(scope)
    }

    /// Scopes with a running watch stream
    pub fn scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self.inner.scopes.lock().keys().cloned().collect();
        scopes.sort();
        scopes
    }

    /// Cache lookup by `namespace/name` key
    pub fn get_by_key(&self, key: &str) -> Option<DynamicObject> {
        self.inner.cache.read().get(key).cloned()
    }

    /// Copy of every cached object
    pub fn list(&self) -> Vec<DynamicObject> {
        self.inner.cache.read().values().cloned().collect()
    }

    /// Abort the worker and every watch stream
    pub fn stop(&self) {
        for (_, handle) in self.inner.scopes.lock().drain() {
            handle.abort();
        }
        if let Some(worker) = self.inner.worker.lock().take() {
            worker.abort();
        }
        tracing::info!("stopped watcher for {}", self.kind());
    }

    /// Apply one watch event to the cache and return the resulting changes.
    ///
    /// A relist (`Init`, `InitApply`..., `InitDone`) re-announces every
    /// object of the scope; cached objects of that scope that were not
    /// re-announced are reported as deleted when it completes.
    pub(crate) fn apply(
        &self,
        scope: &str,
        event: watcher::Event<DynamicObject>,
        relists: &mut Relists,
    ) -> Vec<ResourceEvent> {
        match event {
            watcher::Event::Init => {
                relists.insert(scope.to_string(), HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                let Some(key) = self.checked_key(&obj) else {
                    return Vec::new();
                };
                if let Some(seen) = relists.get_mut(scope) {
                    seen.insert(key.clone());
                }
                vec![self.upsert(key, obj)]
            }
            watcher::Event::InitDone => {
                let Some(seen) = relists.remove(scope) else {
                    return Vec::new();
                };
                let mut cache = self.inner.cache.write();
                let stale: Vec<String> = cache
                    .iter()
                    .filter(|(key, obj)| in_scope(scope, obj) && !seen.contains(*key))
                    .map(|(key, _)| key.clone())
                    .collect();
                stale
                    .into_iter()
                    .filter_map(|key| {
                        cache
                            .remove(&key)
                            .map(|object| ResourceEvent::Deleted { key, object })
                    })
                    .collect()
            }
            watcher::Event::Apply(obj) => match self.checked_key(&obj) {
                Some(key) => vec![self.upsert(key, obj)],
                None => Vec::new(),
            },
            watcher::Event::Delete(obj) => match self.checked_key(&obj) {
                Some(key) => {
                    self.inner.cache.write().remove(&key);
                    vec![ResourceEvent::Deleted { key, object: obj }]
                }
                None => Vec::new(),
            },
        }
    }

    fn upsert(&self, key: String, obj: DynamicObject) -> ResourceEvent {
        let previous = self.inner.cache.write().insert(key.clone(), obj.clone());
        match previous {
            Some(old) => ResourceEvent::Updated { key, old, new: obj },
            None => ResourceEvent::Added { key, object: obj },
        }
    }

    fn checked_key(&self, obj: &DynamicObject) -> Option<String> {
        let key = object_key(obj);
        if key.is_none() {
            tracing::warn!("dropping {} event for object without a name", self.kind());
        }
        key
    }
}

fn in_scope(scope: &str, obj: &DynamicObject) -> bool {
    scope.is_empty() || obj.metadata.namespace.as_deref() == Some(scope)
}

/// Forward one scope's watch stream to the kind's worker
async fn forward_events(
    kind: String,
    scope: String,
    mut stream: crate::kube::WatchStream,
    events_tx: mpsc::Sender<ScopedEvent>,
) {
    let mut error_count = 0u32;
    while let Some(event) = stream.next().await {
        match event {
            Ok(event) => {
                error_count = 0;
                let scoped = ScopedEvent {
                    scope: scope.clone(),
                    event,
                };
                if events_tx.send(scoped).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                error_count = error_count.saturating_add(1);
                // Only log errors occasionally to avoid spam
                if error_count == 1 || error_count % 10 == 0 {
                    tracing::error!(
                        "{} watcher error in '{}' ({}): {}",
                        kind,
                        scope,
                        error_count,
                        e
                    );
                }
                tokio::time::sleep(WATCH_RETRY_DELAY).await;
            }
        }
    }
    tracing::debug!("watch stream for {} in '{}' ended", kind, scope);
}

/// Apply events in arrival order and run the handler for each change
async fn run_worker(
    watcher: ResourceWatcher,
    mut events_rx: mpsc::Receiver<ScopedEvent>,
    handler: Arc<dyn EventHandler>,
    cluster: ClusterWatcher,
) {
    let mut relists = Relists::new();
    while let Some(ScopedEvent { scope, event }) = events_rx.recv().await {
        for change in watcher.apply(&scope, event, &mut relists) {
            let key = change.key().to_string();
            let event_kind = change.kind();
            if let Err(e) = handler.handle(&cluster, &watcher, change).await {
                tracing::warn!(
                    "{} handler failed for {} ({:?}): {}",
                    watcher.kind(),
                    key,
                    event_kind,
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::batch_queue;
    use crate::config::ControllerConfig;
    use crate::kube::MockClusterClient;
    use crate::model::GroupVersionResource;
    use async_trait::async_trait;
    use futures::stream;
    use kube::runtime::watcher::Event;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn deployment_watcher() -> ResourceWatcher {
        let (tx, _rx) = mpsc::channel(1);
        ResourceWatcher::detached(
            KindDescriptor::new(
                GroupVersionResource::new("apps", "v1", "deployments"),
                "Deployment",
                true,
            ),
            tx,
        )
    }

    fn deployment(namespace: &str, name: &str, replicas: i64) -> DynamicObject {
        serde_json::from_value(json!({
            "metadata": { "name": name, "namespace": namespace },
            "spec": { "replicas": replicas }
        }))
        .unwrap()
    }

    #[test]
    fn test_apply_add_update_delete() {
        let watcher = deployment_watcher();
        let mut relists = Relists::new();

        let events = watcher.apply(
            "default",
            Event::Apply(deployment("default", "web", 1)),
            &mut relists,
        );
        assert!(matches!(&events[..], [ResourceEvent::Added { key, .. }] if key == "default/web"));
        assert!(watcher.get_by_key("default/web").is_some());

        let events = watcher.apply(
            "default",
            Event::Apply(deployment("default", "web", 2)),
            &mut relists,
        );
        match &events[..] {
            [ResourceEvent::Updated { old, new, .. }] => {
                assert_eq!(old.data["spec"]["replicas"], 1);
                assert_eq!(new.data["spec"]["replicas"], 2);
            }
            other => panic!("expected update, got {:?}", other),
        }

        let events = watcher.apply(
            "default",
            Event::Delete(deployment("default", "web", 2)),
            &mut relists,
        );
        assert!(matches!(&events[..], [ResourceEvent::Deleted { .. }]));
        assert!(watcher.get_by_key("default/web").is_none());
        assert!(watcher.list().is_empty());
    }

    #[test]
    fn test_initial_listing_is_delivered_as_adds() {
        let watcher = deployment_watcher();
        let mut relists = Relists::new();

        assert!(watcher.apply("default", Event::Init, &mut relists).is_empty());
        let first = watcher.apply(
            "default",
            Event::InitApply(deployment("default", "a", 1)),
            &mut relists,
        );
        let second = watcher.apply(
            "default",
            Event::InitApply(deployment("default", "b", 1)),
            &mut relists,
        );
        assert!(watcher.apply("default", Event::InitDone, &mut relists).is_empty());

        assert!(matches!(&first[..], [ResourceEvent::Added { .. }]));
        assert!(matches!(&second[..], [ResourceEvent::Added { .. }]));
        assert_eq!(watcher.list().len(), 2);
    }

    #[test]
    fn test_relist_prunes_vanished_objects_in_scope_only() {
        let watcher = deployment_watcher();
        let mut relists = Relists::new();
        for obj in [
            deployment("default", "a", 1),
            deployment("default", "b", 1),
            deployment("other", "c", 1),
        ] {
            watcher.apply("", Event::Apply(obj), &mut relists);
        }

        watcher.apply("default", Event::Init, &mut relists);
        let reapplied = watcher.apply(
            "default",
            Event::InitApply(deployment("default", "a", 1)),
            &mut relists,
        );
        assert!(matches!(&reapplied[..], [ResourceEvent::Updated { .. }]));
        let pruned = watcher.apply("default", Event::InitDone, &mut relists);

        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].key(), "default/b");
        assert!(watcher.get_by_key("default/a").is_some());
        assert!(watcher.get_by_key("other/c").is_some());
    }

    #[test]
    fn test_init_done_without_init_prunes_nothing() {
        let watcher = deployment_watcher();
        let mut relists = Relists::new();
        watcher.apply(
            "default",
            Event::Apply(deployment("default", "a", 1)),
            &mut relists,
        );
        assert!(watcher.apply("default", Event::InitDone, &mut relists).is_empty());
        assert_eq!(watcher.list().len(), 1);
    }

    #[test]
    fn test_nameless_object_is_dropped() {
        let watcher = deployment_watcher();
        let mut relists = Relists::new();
        let nameless: DynamicObject =
            serde_json::from_value(json!({ "metadata": { "namespace": "default" } })).unwrap();
        assert!(watcher.apply("default", Event::Apply(nameless), &mut relists).is_empty());
        assert!(watcher.list().is_empty());
    }

    /// Records each event; rejects the first one
    struct RecordingHandler {
        seen: mpsc::UnboundedSender<String>,
        calls: AtomicUsize,
        busy: AtomicBool,
        overlapped: AtomicBool,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(
            &self,
            _cluster: &ClusterWatcher,
            _watcher: &ResourceWatcher,
            event: ResourceEvent,
        ) -> Result<()> {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::task::yield_now().await;
            let _ = self.seen.send(format!("{:?} {}", event.kind(), event.key()));
            self.busy.store(false, Ordering::SeqCst);

            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(Error::UnexpectedObject(event.key().to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_handles_events_in_order_after_handler_error() {
        let mut client = MockClusterClient::new();
        client.expect_watch().times(1).returning(|_, _| {
            let events = vec![
                Event::Apply(deployment("default", "a", 1)),
                Event::Apply(deployment("default", "b", 1)),
                Event::Apply(deployment("default", "a", 2)),
                Event::Delete(deployment("default", "b", 1)),
            ];
            stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed()
        });

        let (tx, mut seen) = mpsc::unbounded_channel();
        let handler = Arc::new(RecordingHandler {
            seen: tx,
            calls: AtomicUsize::new(0),
            busy: AtomicBool::new(false),
            overlapped: AtomicBool::new(false),
        });
        let cluster = ClusterWatcher::new(
            Arc::new(MockClusterClient::new()),
            &ControllerConfig::default(),
            batch_queue(1).0,
        );
        let kind = deployment_watcher().kind().clone();
        let watcher = ResourceWatcher::start(kind, handler.clone(), cluster).unwrap();
        assert!(watcher.watch_scope("default", &client).unwrap());
        assert!(!watcher.watch_scope("default", &client).unwrap());

        let mut order = Vec::new();
        while order.len() < 4 {
            let call = tokio::time::timeout(Duration::from_secs(5), seen.recv())
                .await
                .expect("timed out waiting for handler")
                .expect("handler channel closed");
            order.push(call);
        }

        assert_eq!(
            order,
            vec![
                "Add default/a",
                "Add default/b",
                "Update default/a",
                "Delete default/b",
            ]
        );
        assert!(!handler.overlapped.load(Ordering::SeqCst));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
        assert_eq!(watcher.list().len(), 1);
        watcher.stop();
    }
}
