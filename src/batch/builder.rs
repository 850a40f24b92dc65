//! Batch construction from parsed changes
//!
//! These functions only look at the application snapshot held by the
//! resolver, which keeps them independent of the watch machinery.

use super::Batch;
use crate::error::Result;
use crate::matching::same_labels;
use crate::model::ResourceInfo;
use crate::resolver::AncestorResolver;

/// A change to one resource, with the snapshots that describe it
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Added(T),
    Updated { old: T, new: T },
    Deleted(T),
}

impl<T> Change<T> {
    /// Convert every snapshot, failing on the first error
    pub fn try_map<U, F>(self, mut f: F) -> Result<Change<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        Ok(match self {
            Change::Added(obj) => Change::Added(f(obj)?),
            Change::Updated { old, new } => Change::Updated {
                old: f(old)?,
                new: f(new)?,
            },
            Change::Deleted(obj) => Change::Deleted(f(obj)?),
        })
    }

    /// Snapshot that is current after the change (the last one for deletes)
    pub fn latest(&self) -> &T {
        match self {
            Change::Added(obj) | Change::Deleted(obj) => obj,
            Change::Updated { new, .. } => new,
        }
    }
}

/// Batch for a change to a non-application resource.
///
/// Deleted resources only contribute their former ancestors. Added and
/// updated ones contribute their ancestors and themselves; on a label change
/// the ancestors selected by the old labels are included as well.
pub fn resource_batch(resolver: &AncestorResolver<'_>, change: Change<ResourceInfo>) -> Batch {
    let mut batch = Batch::default();
    match change {
        Change::Deleted(old) => {
            tracing::debug!("processing deleted resource {}", old.key());
            batch.add_applications(resolver.ancestors_of(&old));
        }
        Change::Added(new) => {
            tracing::debug!("processing added resource {}", new.key());
            batch.add_applications(resolver.ancestors_of(&new));
            batch.add_resource(new);
        }
        Change::Updated { old, new } => {
            tracing::debug!("processing updated resource {}", new.key());
            if !same_labels(old.labels.as_ref(), new.labels.as_ref()) {
                batch.add_applications(resolver.ancestors_of(&old));
            }
            batch.add_applications(resolver.ancestors_of(&new));
            batch.add_resource(new);
        }
    }
    batch
}

/// Batch for a change to an application.
///
/// The application itself and all of its ancestors are included. On update
/// the old and new snapshots are resolved separately, since a label change
/// moves the application between parents and a selector change alters its
/// own components.
pub fn application_batch(resolver: &AncestorResolver<'_>, change: Change<ResourceInfo>) -> Batch {
    let mut batch = Batch::default();
    match change {
        Change::Deleted(old) => {
            tracing::debug!("processing application deleted: {}", old.key());
            batch.add_applications(resolver.ancestors_of(&old));
        }
        Change::Added(new) => {
            tracing::debug!("processing application added: {}", new.key());
            batch.add_applications(resolver.ancestors_of(&new));
        }
        Change::Updated { old, new } => {
            tracing::debug!("processing application updated: {}", new.key());
            batch.add_applications(resolver.ancestors_of(&old));
            batch.add_applications(resolver.ancestors_of(&new));
        }
    }
    batch
}
