//! Cluster API access for dynamically discovered kinds

use crate::error::{Error, Result};
use crate::model::{GroupKind, GroupVersionResource, KindDescriptor};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use kube::api::{Api, DeleteParams, ListParams};
use kube::core::DynamicObject;
use kube::discovery::{Discovery, Scope};
use kube::runtime::watcher;
use kube::Client;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;

/// Watch events for one kind in one scope, starting with the initial listing
pub type WatchStream = BoxStream<'static, Result<watcher::Event<DynamicObject>>>;

/// Operations the controller performs against the API server.
///
/// Namespace arguments use "" for "all namespaces" (watch) or for
/// cluster-scoped objects (get and delete).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Map a declared group and kind to a watchable resource.
    ///
    /// Returns `None` when the cluster does not serve the kind.
    async fn resolve_kind(&self, kind: &GroupKind) -> Result<Option<KindDescriptor>>;

    /// Fail when `kind` cannot be listed in `namespace`.
    ///
    /// Watch streams report access problems only once polled, so this is
    /// checked before a watch is started.
    async fn check_access(&self, kind: &KindDescriptor, namespace: &str) -> Result<()>;

    /// Open a watch. The stream lists existing objects before live changes.
    fn watch(&self, kind: &KindDescriptor, namespace: &str) -> WatchStream;

    async fn get(
        &self,
        kind: &KindDescriptor,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>>;

    async fn delete(&self, kind: &KindDescriptor, namespace: &str, name: &str) -> Result<()>;
}

/// Discovery answers per declared kind, including kinds the cluster does
/// not serve
#[derive(Debug, Default)]
pub struct KindCache {
    kinds: Mutex<HashMap<GroupKind, Option<KindDescriptor>>>,
}

impl KindCache {
    /// Answer from the cache, running `discover` only for kinds never asked
    /// about. Failed lookups are not cached.
    pub async fn resolve_with<F, Fut>(
        &self,
        kind: &GroupKind,
        discover: F,
    ) -> Result<Option<KindDescriptor>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<KindDescriptor>>>,
    {
        let cached = self.kinds.lock().get(kind).cloned();
        if let Some(answer) = cached {
            return Ok(answer);
        }
        let answer = discover().await?;
        self.kinds.lock().insert(kind.clone(), answer.clone());
        Ok(answer)
    }
}

/// [`ClusterClient`] backed by a live kube [`Client`]
pub struct KubeClusterClient {
    client: Client,
    kinds: KindCache,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kinds: KindCache::default(),
        }
    }

    async fn discover(&self, kind: &GroupKind) -> Result<Option<KindDescriptor>> {
        let group = kind.api_group();
        let discovery = Discovery::new(self.client.clone())
            .filter(&[group])
            .run()
            .await?;

        let Some((resource, capabilities)) = discovery
            .groups()
            .find(|g| g.name() == group)
            .and_then(|g| g.recommended_kind(&kind.kind))
        else {
            tracing::debug!("discovery found no resource for {}", kind);
            return Ok(None);
        };

        let descriptor = KindDescriptor::new(
            GroupVersionResource::new(&resource.group, &resource.version, &resource.plural),
            &resource.kind,
            matches!(capabilities.scope, Scope::Namespaced),
        );
        tracing::debug!("resolved {} to {}", kind, descriptor);
        Ok(Some(descriptor))
    }

    fn api(&self, kind: &KindDescriptor, namespace: &str) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        if !kind.namespaced || namespace.is_empty() {
            Api::all_with(self.client.clone(), &resource)
        } else {
            Api::namespaced_with(self.client.clone(), namespace, &resource)
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn resolve_kind(&self, kind: &GroupKind) -> Result<Option<KindDescriptor>> {
        self.kinds.resolve_with(kind, || self.discover(kind)).await
    }

    async fn check_access(&self, kind: &KindDescriptor, namespace: &str) -> Result<()> {
        self.api(kind, namespace)
            .list(&ListParams::default().limit(1))
            .await?;
        Ok(())
    }

    fn watch(&self, kind: &KindDescriptor, namespace: &str) -> WatchStream {
        let api = self.api(kind, namespace);
        watcher(api, watcher::Config::default())
            .map_err(Error::from)
            .boxed()
    }

    async fn get(
        &self,
        kind: &KindDescriptor,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        Ok(self.api(kind, namespace).get_opt(name).await?)
    }

    async fn delete(&self, kind: &KindDescriptor, namespace: &str, name: &str) -> Result<()> {
        self.api(kind, namespace)
            .delete(name, &DeleteParams::default())
            .await?;
        tracing::info!("deleted {} {}/{}", kind, namespace, name);
        Ok(())
    }
}
