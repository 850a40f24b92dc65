//! Resource kind descriptors
//!
//! A watched kind is identified by its group/version/resource triple. The
//! descriptor adds what discovery tells us about it: the `Kind` name and
//! whether it lives in namespaces.

use kube::core::ApiResource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Group/version/resource triple identifying a category of cluster objects
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupVersionResource {
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    /// `apiVersion` string as it appears on objects of this kind
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// Group + kind pair, as declared in an application's `componentKinds`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKind {
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl GroupKind {
    pub fn new(group: &str, kind: &str) -> Self {
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }

    /// Group name as served by discovery ("core" is the legacy empty group)
    pub fn api_group(&self) -> &str {
        match self.group.as_str() {
            "core" => "",
            group => group,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}.{}", self.kind, self.group)
        }
    }
}

/// A discovered, watchable kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindDescriptor {
    #[serde(flatten)]
    pub gvr: GroupVersionResource,
    pub kind: String,
    #[serde(default = "default_namespaced")]
    pub namespaced: bool,
}

fn default_namespaced() -> bool {
    true
}

impl KindDescriptor {
    pub fn new(gvr: GroupVersionResource, kind: &str, namespaced: bool) -> Self {
        Self {
            gvr,
            kind: kind.to_string(),
            namespaced,
        }
    }

    /// Dynamic API descriptor used to build `Api<DynamicObject>` handles
    pub fn api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.gvr.group.clone(),
            version: self.gvr.version.clone(),
            api_version: self.gvr.api_version(),
            kind: self.kind.clone(),
            plural: self.gvr.resource.clone(),
        }
    }
}

impl fmt::Display for KindDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.gvr)
    }
}
