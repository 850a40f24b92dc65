//! Resource snapshots and identity keys

use super::kind::{GroupVersionResource, KindDescriptor};
use crate::error::{Error, Result};
use kube::core::DynamicObject;
use std::collections::BTreeMap;
use std::fmt;

/// Label set of a resource. `None` and an empty map are different values.
pub type Labels = Option<BTreeMap<String, String>>;

/// Stable identity of a resource: kind descriptor, namespace and name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey {
    pub gvr: GroupVersionResource,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}:{}", self.gvr, self.name)
        } else {
            write!(f, "{}:{}/{}", self.gvr, self.namespace, self.name)
        }
    }
}

/// Immutable snapshot of a watched resource
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInfo {
    pub gvr: GroupVersionResource,
    pub kind: String,
    /// Empty for cluster-scoped resources
    pub namespace: String,
    pub name: String,
    pub labels: Labels,
    /// Raw object metadata (owner references, annotations, ...)
    pub metadata: serde_json::Value,
}

impl ResourceInfo {
    /// Snapshot a dynamic object of the given kind
    pub fn from_object(kind: &KindDescriptor, obj: &DynamicObject) -> Result<Self> {
        let name = obj.metadata.name.clone().ok_or_else(|| {
            Error::UnexpectedObject(format!("{} object without metadata.name", kind.kind))
        })?;
        let metadata = serde_json::to_value(&obj.metadata)
            .map_err(|e| Error::UnexpectedObject(format!("{}/{}: {}", kind.kind, name, e)))?;

        Ok(Self {
            gvr: kind.gvr.clone(),
            kind: obj
                .types
                .as_ref()
                .map(|t| t.kind.clone())
                .unwrap_or_else(|| kind.kind.clone()),
            namespace: obj.metadata.namespace.clone().unwrap_or_default(),
            name,
            labels: obj.metadata.labels.clone(),
            metadata,
        })
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey {
            gvr: self.gvr.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    /// True when both snapshots describe the same cluster object
    pub fn is_same_resource(&self, other: &ResourceInfo) -> bool {
        self.gvr == other.gvr && self.namespace == other.namespace && self.name == other.name
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

/// Cache key of an object within one kind's watcher (`namespace/name`)
pub fn object_key(obj: &DynamicObject) -> Option<String> {
    let name = obj.metadata.name.as_deref()?;
    Some(match obj.metadata.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
        _ => name.to_string(),
    })
}
