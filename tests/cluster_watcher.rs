//! End-to-end runs of the watcher and batch processor over an in-memory
//! cluster

use appnav_controller::{Error, Result};
use appnav_controller::batch::{Batch, BatchProcessor, batch_queue};
use appnav_controller::config::ControllerConfig;
use appnav_controller::kube::{ClusterClient, WatchStream};
use appnav_controller::model::{
    AppResourceInfo, COMPONENT_NAMESPACES_ANNOTATION, GroupKind, GroupVersionResource,
    KindDescriptor, ResourceInfo, ResourceKey,
};
use appnav_controller::status::StatusCallback;
use appnav_controller::watcher::ClusterWatcher;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use kube::core::DynamicObject;
use kube::runtime::watcher::Event;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn application_kind() -> KindDescriptor {
    ControllerConfig::default().application_kind
}

fn deployment_kind() -> KindDescriptor {
    KindDescriptor::new(
        GroupVersionResource::new("apps", "v1", "deployments"),
        "Deployment",
        true,
    )
}

fn auto5_app() -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "app.k8s.io/v1beta1",
        "kind": "Application",
        "metadata": { "name": "auto5-app", "namespace": "default" },
        "spec": {
            "componentKinds": [
                { "group": "apps", "kind": "Deployment" },
                { "group": "example.com", "kind": "Widget" }
            ],
            "selector": { "matchLabels": { "app": "auto5b-app" } }
        }
    }))
    .unwrap()
}

fn auto5() -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": "auto5",
            "namespace": "default",
            "labels": { "app": "auto5b-app" }
        },
        "spec": { "replicas": 1 }
    }))
    .unwrap()
}

/// Cluster serving a fixed set of objects per (kind, scope), followed by
/// live updates
#[derive(Default)]
struct FakeCluster {
    objects: HashMap<(GroupVersionResource, String), Vec<DynamicObject>>,
    updates: HashMap<(GroupVersionResource, String), Vec<DynamicObject>>,
    forbidden: HashSet<GroupVersionResource>,
    watches: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeCluster {
    fn with(mut self, kind: &KindDescriptor, scope: &str, objects: Vec<DynamicObject>) -> Self {
        self.objects
            .insert((kind.gvr.clone(), scope.to_string()), objects);
        self
    }

    fn with_updates(
        mut self,
        kind: &KindDescriptor,
        scope: &str,
        objects: Vec<DynamicObject>,
    ) -> Self {
        self.updates
            .insert((kind.gvr.clone(), scope.to_string()), objects);
        self
    }

    fn forbid(mut self, kind: &KindDescriptor) -> Self {
        self.forbidden.insert(kind.gvr.clone());
        self
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn resolve_kind(&self, kind: &GroupKind) -> Result<Option<KindDescriptor>> {
        Ok(match kind.kind.as_str() {
            "Deployment" => Some(deployment_kind()),
            "Application" => Some(application_kind()),
            _ => None,
        })
    }

    async fn check_access(&self, kind: &KindDescriptor, namespace: &str) -> Result<()> {
        if self.forbidden.contains(&kind.gvr) {
            return Err(Error::WatchStart {
                kind: kind.to_string(),
                reason: format!("list forbidden in '{}'", namespace),
            });
        }
        Ok(())
    }

    fn watch(&self, kind: &KindDescriptor, namespace: &str) -> WatchStream {
        self.watches.lock().push(format!("{} '{}'", kind.gvr, namespace));
        let scope = (kind.gvr.clone(), namespace.to_string());
        let objects = self.objects.get(&scope).cloned().unwrap_or_default();
        let updates = self.updates.get(&scope).cloned().unwrap_or_default();

        let mut events = vec![Event::Init];
        events.extend(objects.into_iter().map(Event::InitApply));
        events.push(Event::InitDone);
        events.extend(updates.into_iter().map(Event::Apply));
        stream::iter(events.into_iter().map(Ok))
            .chain(stream::pending())
            .boxed()
    }

    async fn get(
        &self,
        _kind: &KindDescriptor,
        _namespace: &str,
        _name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(None)
    }

    async fn delete(&self, kind: &KindDescriptor, namespace: &str, name: &str) -> Result<()> {
        self.deletes
            .lock()
            .push(format!("{} {}/{}", kind.gvr, namespace, name));
        Ok(())
    }
}

fn fake_cluster() -> Arc<FakeCluster> {
    Arc::new(
        FakeCluster::default()
            .with(&application_kind(), "", vec![auto5_app()])
            .with(&deployment_kind(), "default", vec![auto5()]),
    )
}

async fn batch_with_resource(rx: &mut mpsc::Receiver<Batch>, name: &str) -> Batch {
    loop {
        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for batch")
            .expect("batch queue closed");
        if batch.non_applications.keys().any(|k| k.name == name) {
            return batch;
        }
    }
}

#[tokio::test]
async fn test_component_event_batches_its_application() {
    let client = fake_cluster();
    let (batches, mut rx) = batch_queue(16);
    let cluster = ClusterWatcher::new(client.clone(), &ControllerConfig::default(), batches);
    cluster.start().await.unwrap();

    let batch = batch_with_resource(&mut rx, "auto5").await;
    let apps: Vec<&str> = batch.applications.keys().map(|k| k.name.as_str()).collect();
    assert_eq!(apps, vec!["auto5-app"]);
    assert_eq!(batch.non_applications.len(), 1);

    // the unknown Widget kind was skipped, Deployment is watched in the
    // application's namespace only
    let kinds: Vec<String> = cluster
        .watched_kinds()
        .iter()
        .map(|k| k.kind.clone())
        .collect();
    assert_eq!(kinds, vec!["Application", "Deployment"]);
    assert!(
        client
            .watches
            .lock()
            .contains(&"apps/v1/deployments 'default'".to_string())
    );
    assert_eq!(cluster.list_resources(&deployment_kind().gvr).len(), 1);

    cluster.stop();
}

#[tokio::test]
async fn test_delete_only_reaches_watched_kinds() {
    let client = fake_cluster();
    let (batches, mut rx) = batch_queue(16);
    let cluster = ClusterWatcher::new(client.clone(), &ControllerConfig::default(), batches);
    cluster.start().await.unwrap();
    batch_with_resource(&mut rx, "auto5").await;

    let watched = ResourceInfo::from_object(&deployment_kind(), &auto5()).unwrap();
    cluster.delete_resource(&watched).await.unwrap();

    let unwatched = ResourceInfo {
        gvr: GroupVersionResource::new("", "v1", "configmaps"),
        kind: "ConfigMap".to_string(),
        ..watched.clone()
    };
    cluster.delete_resource(&unwatched).await.unwrap();
    assert!(cluster.resource_deleted(&unwatched).await.unwrap());

    assert_eq!(
        *client.deletes.lock(),
        vec!["apps/v1/deployments default/auto5".to_string()]
    );
    cluster.stop();
}

#[derive(Clone)]
struct ChannelCallback {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl StatusCallback for ChannelCallback {
    async fn calculate_status(&self, key: &ResourceKey, _application: &ResourceInfo) {
        let _ = self.tx.send(format!("status {}", key.name));
    }

    async fn component_changed(&self, key: &ResourceKey, _resource: &ResourceInfo) {
        let _ = self.tx.send(format!("component {}", key.name));
    }
}

#[tokio::test]
async fn test_processor_reports_application_status() {
    let client = fake_cluster();
    let (batches, rx) = batch_queue(16);
    let cluster = ClusterWatcher::new(client, &ControllerConfig::default(), batches);

    let (tx, mut calls) = mpsc::unbounded_channel();
    let processor = BatchProcessor::new(rx, Duration::from_millis(20), ChannelCallback { tx });
    let processor = tokio::spawn(processor.run());
    cluster.start().await.unwrap();

    let expected = ["component auto5".to_string(), "status auto5-app".to_string()];
    let mut seen = Vec::new();
    while !expected.iter().all(|call| seen.contains(call)) {
        let call = tokio::time::timeout(Duration::from_secs(5), calls.recv())
            .await
            .expect("timed out waiting for status call")
            .expect("callback channel closed");
        seen.push(call);
    }

    cluster.stop();
    processor.abort();
}

#[tokio::test]
async fn test_unlistable_component_kind_fails_application() {
    let client = Arc::new(
        FakeCluster::default()
            .with(&deployment_kind(), "default", vec![auto5()])
            .forbid(&deployment_kind()),
    );
    let (batches, mut rx) = batch_queue(16);
    let cluster = ClusterWatcher::new(client.clone(), &ControllerConfig::default(), batches);

    let app = AppResourceInfo::from_object(
        &application_kind(),
        &auto5_app(),
        COMPONENT_NAMESPACES_ANNOTATION,
    )
    .unwrap();
    let err = cluster.watch_application_components(&app).await.unwrap_err();
    assert!(matches!(err, Error::WatchStart { .. }));
    assert!(cluster.get_watch_gvr(&deployment_kind().gvr).is_none());
    assert!(client.watches.lock().is_empty());

    // through the watch, the application event is dropped without a batch
    cluster.start().await.unwrap();
    let received = tokio::time::timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(received.is_err(), "unexpected batch: {:?}", received);
    let kinds: Vec<String> = cluster
        .watched_kinds()
        .iter()
        .map(|k| k.kind.clone())
        .collect();
    assert_eq!(kinds, vec!["Application"]);

    cluster.stop();
}

fn nested_application(name: &str, labels: Value, match_labels: Value) -> DynamicObject {
    serde_json::from_value(json!({
        "apiVersion": "app.k8s.io/v1beta1",
        "kind": "Application",
        "metadata": { "name": name, "namespace": "default", "labels": labels },
        "spec": {
            "componentKinds": [{ "group": "app.k8s.io", "kind": "Application" }],
            "selector": { "matchLabels": match_labels }
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn test_application_update_batches_old_and_new_parents() {
    let child_old = nested_application("child", json!({ "parent": "p1" }), json!({ "app": "x" }));
    let child_new = nested_application("child", json!({ "parent": "p2" }), json!({ "app": "y" }));
    let client = Arc::new(
        FakeCluster::default()
            .with(
                &application_kind(),
                "",
                vec![
                    nested_application("p1", json!({}), json!({ "parent": "p1" })),
                    nested_application("p2", json!({}), json!({ "parent": "p2" })),
                    child_old,
                ],
            )
            .with_updates(&application_kind(), "", vec![child_new]),
    );
    let (batches, mut rx) = batch_queue(16);
    let cluster = ClusterWatcher::new(client, &ControllerConfig::default(), batches);
    cluster.start().await.unwrap();

    let batch = loop {
        let batch = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for batch")
            .expect("batch queue closed");
        let names: Vec<&str> = batch.applications.keys().map(|k| k.name.as_str()).collect();
        if names.contains(&"child") && names.contains(&"p2") {
            break batch;
        }
    };

    let apps: Vec<&str> = batch.applications.keys().map(|k| k.name.as_str()).collect();
    assert_eq!(apps, vec!["child", "p1", "p2"]);
    assert!(batch.non_applications.is_empty());
    cluster.stop();
}
