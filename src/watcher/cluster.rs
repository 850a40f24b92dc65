//! Registry of per-kind watchers
//!
//! The [`ClusterWatcher`] owns one [`ResourceWatcher`] per watched kind and
//! the [`NamespaceFilter`] deciding which namespaces each kind is watched
//! in. It starts with the application kind only; further kinds are added as
//! applications declare them as component kinds.

use super::{EventHandler, NamespaceFilter, ResourceWatcher};
use crate::batch::{ApplicationBatchHandler, BatchSender, ResourceBatchHandler};
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::kube::ClusterClient;
use crate::model::{AppResourceInfo, GroupVersionResource, KindDescriptor, ResourceInfo};
use crate::resolver::AncestorResolver;
use kube::core::DynamicObject;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct Inner {
    client: Arc<dyn ClusterClient>,
    namespaces: NamespaceFilter,
    application_kind: KindDescriptor,
    namespaces_annotation: String,
    watchers: RwLock<HashMap<GroupVersionResource, ResourceWatcher>>,
    batches: BatchSender,
}

/// Shared handle to the watch registry
#[derive(Clone)]
pub struct ClusterWatcher {
    inner: Arc<Inner>,
}

impl ClusterWatcher {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        config: &ControllerConfig,
        batches: BatchSender,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                namespaces: NamespaceFilter::new(config.namespaces.iter().cloned()),
                application_kind: config.application_kind.clone(),
                namespaces_annotation: config.component_namespaces_annotation.clone(),
                watchers: RwLock::new(HashMap::new()),
                batches,
            }),
        }
    }

    /// Start watching applications. Component kinds follow from their specs.
    pub async fn start(&self) -> Result<()> {
        let kind = self.inner.application_kind.clone();
        self.add_to_watch(&kind).await
    }

    /// Make sure `kind` is watched in every namespace currently permitted
    /// for it.
    ///
    /// Idempotent: an existing watcher only gains the scopes permitted since
    /// it was started. Namespace permissions must be granted before calling
    /// this, or the new namespaces are not listed. Every new scope must be
    /// listable; otherwise nothing is started and [`Error::WatchStart`] is
    /// returned.
    pub async fn add_to_watch(&self, kind: &KindDescriptor) -> Result<()> {
        let existing = self.watcher(&kind.gvr);
        let scopes: Vec<String> = self
            .scopes_for(kind)
            .into_iter()
            .filter(|scope| existing.as_ref().is_none_or(|w| !w.has_scope(scope)))
            .collect();

        for scope in &scopes {
            self.inner
                .client
                .check_access(kind, scope)
                .await
                .map_err(|e| match e {
                    Error::WatchStart { .. } => e,
                    other => Error::WatchStart {
                        kind: kind.to_string(),
                        reason: format!("cannot list in '{}': {}", scope, other),
                    },
                })?;
        }

        let watcher = {
            let mut watchers = self.inner.watchers.write();
            match watchers.get(&kind.gvr) {
                Some(existing) => existing.clone(),
                None => {
                    let handler: Arc<dyn EventHandler> =
                        if kind.gvr == self.inner.application_kind.gvr {
                            Arc::new(ApplicationBatchHandler)
                        } else {
                            Arc::new(ResourceBatchHandler)
                        };
                    let watcher = ResourceWatcher::start(kind.clone(), handler, self.clone())?;
                    watchers.insert(kind.gvr.clone(), watcher.clone());
                    watcher
                }
            }
        };

        for scope in &scopes {
            watcher.watch_scope(scope, self.inner.client.as_ref())?;
        }
        Ok(())
    }

    /// Scopes a kind should be watched in ("" means every namespace)
    fn scopes_for(&self, kind: &KindDescriptor) -> Vec<String> {
        let namespaces = &self.inner.namespaces;
        if !kind.namespaced {
            return vec![String::new()];
        }
        if kind.gvr == self.inner.application_kind.gvr {
            if namespaces.permits_all() {
                return vec![String::new()];
            }
            return namespaces.global_namespaces();
        }
        namespaces.permitted_namespaces(&kind.gvr)
    }

    /// Descriptor of a watched kind, `None` when the kind is not watched
    pub fn get_watch_gvr(&self, gvr: &GroupVersionResource) -> Option<KindDescriptor> {
        self.inner
            .watchers
            .read()
            .get(gvr)
            .map(|watcher| watcher.kind().clone())
    }

    /// Cached objects of a kind; empty when the kind is not watched
    pub fn list_resources(&self, gvr: &GroupVersionResource) -> Vec<DynamicObject> {
        self.watcher(gvr).map(|w| w.list()).unwrap_or_default()
    }

    pub fn watcher(&self, gvr: &GroupVersionResource) -> Option<ResourceWatcher> {
        self.inner.watchers.read().get(gvr).cloned()
    }

    /// Kinds with a running watcher
    pub fn watched_kinds(&self) -> Vec<KindDescriptor> {
        let mut kinds: Vec<KindDescriptor> = self
            .inner
            .watchers
            .read()
            .values()
            .map(|w| w.kind().clone())
            .collect();
        kinds.sort_by(|a, b| a.gvr.cmp(&b.gvr));
        kinds
    }

    pub fn is_namespace_permitted(&self, namespace: &str) -> bool {
        self.inner.namespaces.is_namespace_permitted(namespace)
    }

    pub fn permit_namespace(&self, kind: &GroupVersionResource, namespace: &str) -> bool {
        self.inner.namespaces.permit_namespace(kind, namespace)
    }

    /// Parse every cached application, skipping those that fail to parse
    pub fn application_snapshot(&self) -> Vec<AppResourceInfo> {
        let kind = &self.inner.application_kind;
        self.list_resources(&kind.gvr)
            .iter()
            .filter_map(|obj| {
                match AppResourceInfo::from_object(kind, obj, &self.inner.namespaces_annotation) {
                    Ok(app) => Some(app),
                    Err(e) => {
                        tracing::warn!("skipping application: {}", e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Resolver over `applications`, usually an [`application_snapshot`]
    ///
    /// [`application_snapshot`]: ClusterWatcher::application_snapshot
    pub fn resolver<'a>(&'a self, applications: &'a [AppResourceInfo]) -> AncestorResolver<'a> {
        AncestorResolver::new(
            &self.inner.application_kind.gvr,
            applications,
            &self.inner.namespaces,
        )
    }

    /// Start watches for every component kind `app` declares.
    ///
    /// The application's namespace and its extra component namespaces are
    /// permitted for each kind first. Kinds unknown to the cluster are
    /// skipped; a watch that fails to start aborts the call.
    pub async fn watch_application_components(&self, app: &AppResourceInfo) -> Result<()> {
        for component in &app.component_kinds {
            let Some(kind) = self.inner.client.resolve_kind(component).await? else {
                tracing::warn!(
                    "application {} declares unknown component kind {}",
                    app.resource.key(),
                    component
                );
                continue;
            };

            if kind.namespaced {
                if self.permit_namespace(&kind.gvr, app.namespace()) {
                    tracing::debug!("permitted namespace {} for {}", app.namespace(), kind);
                }
                for namespace in &app.component_namespaces {
                    if self.permit_namespace(&kind.gvr, namespace) {
                        tracing::debug!("permitted namespace {} for {}", namespace, kind);
                    }
                }
            }
            self.add_to_watch(&kind).await?;
        }
        Ok(())
    }

    /// Delete a resource through the API server.
    ///
    /// Succeeds without a request when its kind is no longer watched.
    pub async fn delete_resource(&self, resource: &ResourceInfo) -> Result<()> {
        let Some(kind) = self.get_watch_gvr(&resource.gvr) else {
            tracing::debug!("not deleting {}: kind is not watched", resource.key());
            return Ok(());
        };
        self.inner
            .client
            .delete(&kind, &resource.namespace, &resource.name)
            .await
    }

    /// True when the resource is gone, or its kind is no longer watched
    pub async fn resource_deleted(&self, resource: &ResourceInfo) -> Result<bool> {
        let Some(kind) = self.get_watch_gvr(&resource.gvr) else {
            return Ok(true);
        };
        let found = self
            .inner
            .client
            .get(&kind, &resource.namespace, &resource.name)
            .await?;
        Ok(found.is_none())
    }

    /// Stop every watcher
    pub fn stop(&self) {
        let watchers: Vec<ResourceWatcher> =
            self.inner.watchers.write().drain().map(|(_, w)| w).collect();
        for watcher in watchers {
            watcher.stop();
        }
    }

    pub fn client(&self) -> &Arc<dyn ClusterClient> {
        &self.inner.client
    }

    pub fn namespaces(&self) -> &NamespaceFilter {
        &self.inner.namespaces
    }

    pub fn application_kind(&self) -> &KindDescriptor {
        &self.inner.application_kind
    }

    pub fn namespaces_annotation(&self) -> &str {
        &self.inner.namespaces_annotation
    }

    pub fn batches(&self) -> &BatchSender {
        &self.inner.batches
    }
}
