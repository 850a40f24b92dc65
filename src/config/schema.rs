//! Configuration schema definitions
//!
//! Defines the structure of configuration files using serde for serialization.

use crate::model::{COMPONENT_NAMESPACES_ANNOTATION, GroupVersionResource, KindDescriptor};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerConfig {
    /// Kind whose objects define applications
    #[serde(default = "default_application_kind")]
    pub application_kind: KindDescriptor,

    /// Namespaces the controller may watch; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub namespaces: Vec<String>,

    /// Coalescing window of the batch processor
    #[serde(default = "default_batch_duration_ms")]
    pub batch_duration_ms: u64,

    /// Bounded size of the batch queue
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Annotation listing extra namespaces components may come from
    #[serde(default = "default_namespaces_annotation")]
    pub component_namespaces_annotation: String,
}

impl ControllerConfig {
    pub fn batch_duration(&self) -> Duration {
        Duration::from_millis(self.batch_duration_ms)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            application_kind: default_application_kind(),
            namespaces: Vec::new(),
            batch_duration_ms: default_batch_duration_ms(),
            queue_capacity: default_queue_capacity(),
            component_namespaces_annotation: default_namespaces_annotation(),
        }
    }
}

fn default_application_kind() -> KindDescriptor {
    KindDescriptor::new(
        GroupVersionResource::new("app.k8s.io", "v1beta1", "applications"),
        "Application",
        true,
    )
}

fn default_batch_duration_ms() -> u64 {
    1000
}

fn default_queue_capacity() -> usize {
    256
}

fn default_namespaces_annotation() -> String {
    COMPONENT_NAMESPACES_ANNOTATION.to_string()
}
