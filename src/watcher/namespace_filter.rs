//! Namespace permissions per watched kind
//!
//! A global list decides which namespaces the controller may look at at all
//! (empty means every namespace). On top of that each kind keeps the set of
//! namespaces some application asked components to be drawn from; only
//! those namespaces get a watch for that kind.

use crate::model::GroupVersionResource;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Thread-safe table of permitted namespaces
#[derive(Debug, Default)]
pub struct NamespaceFilter {
    global: BTreeSet<String>,
    per_kind: RwLock<HashMap<GroupVersionResource, BTreeSet<String>>>,
}

impl NamespaceFilter {
    /// Create a filter restricted to `namespaces`, or open to all when empty
    pub fn new<I, S>(namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            global: namespaces.into_iter().map(Into::into).collect(),
            per_kind: RwLock::new(HashMap::new()),
        }
    }

    /// True when every namespace is permitted
    pub fn permits_all(&self) -> bool {
        self.global.is_empty()
    }

    /// Globally permitted namespaces; empty when all are permitted
    pub fn global_namespaces(&self) -> Vec<String> {
        self.global.iter().cloned().collect()
    }

    /// Kind-independent check
    pub fn is_namespace_permitted(&self, namespace: &str) -> bool {
        self.global.is_empty() || self.global.contains(namespace)
    }

    /// Permit `namespace` for `kind`.
    ///
    /// Returns true when the namespace was newly added. Namespaces outside
    /// the global list are refused.
    pub fn permit_namespace(&self, kind: &GroupVersionResource, namespace: &str) -> bool {
        if namespace.is_empty() || !self.is_namespace_permitted(namespace) {
            tracing::debug!("namespace '{}' not permitted for {}", namespace, kind);
            return false;
        }
        let mut per_kind = self.per_kind.write();
        per_kind
            .entry(kind.clone())
            .or_default()
            .insert(namespace.to_string())
    }

    pub fn is_permitted_for(&self, kind: &GroupVersionResource, namespace: &str) -> bool {
        self.per_kind
            .read()
            .get(kind)
            .is_some_and(|namespaces| namespaces.contains(namespace))
    }

    /// Namespaces currently permitted for `kind`
    pub fn permitted_namespaces(&self, kind: &GroupVersionResource) -> Vec<String> {
        self.per_kind
            .read()
            .get(kind)
            .map(|namespaces| namespaces.iter().cloned().collect())
            .unwrap_or_default()
    }
}
