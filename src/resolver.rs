//! Ancestor resolution
//!
//! Walks the "is component of" relation upward from a changed resource and
//! collects every application whose status may depend on it. The walk runs
//! over a point-in-time copy of the application cache, so its result is only
//! as fresh as that copy.

use crate::matching::resource_component_of_application;
use crate::model::{AppResourceInfo, GroupVersionResource, ResourceInfo, ResourceKey};
use crate::watcher::NamespaceFilter;
use std::collections::BTreeMap;

/// Applications found by a walk, keyed by identity
pub type FoundApplications = BTreeMap<ResourceKey, ResourceInfo>;

/// Resolver over a snapshot of parsed applications
pub struct AncestorResolver<'a> {
    application_kind: &'a GroupVersionResource,
    applications: &'a [AppResourceInfo],
    namespaces: &'a NamespaceFilter,
}

impl<'a> AncestorResolver<'a> {
    pub fn new(
        application_kind: &'a GroupVersionResource,
        applications: &'a [AppResourceInfo],
        namespaces: &'a NamespaceFilter,
    ) -> Self {
        Self {
            application_kind,
            applications,
            namespaces,
        }
    }

    /// Applications that list `resource` as a direct component
    pub fn applications_for_resource(&self, resource: &ResourceInfo) -> Vec<&'a AppResourceInfo> {
        let namespaces = self.namespaces;
        self.applications
            .iter()
            .filter(|app| resource_component_of_application(namespaces, app, resource))
            .collect()
    }

    /// Collect every application that transitively contains `resource`.
    ///
    /// When `resource` is itself an application it is recorded too. An
    /// application already present in `already_found` is not walked again,
    /// which bounds the walk on cycles and diamonds.
    pub fn find_all_applications_for_resource(
        &self,
        resource: &ResourceInfo,
        already_found: &mut FoundApplications,
    ) {
        if &resource.gvr == self.application_kind {
            let key = resource.key();
            if already_found.contains_key(&key) {
                return;
            }
            already_found.insert(key, resource.clone());
        }

        for app in self.applications_for_resource(resource) {
            tracing::trace!("{} is a component of {}", resource.key(), app.resource.key());
            self.find_all_applications_for_resource(&app.resource, already_found);
        }
    }

    /// Convenience wrapper returning a fresh result map
    pub fn ancestors_of(&self, resource: &ResourceInfo) -> FoundApplications {
        let mut found = FoundApplications::new();
        self.find_all_applications_for_resource(resource, &mut found);
        found
    }
}
