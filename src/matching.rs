//! Component matching
//!
//! Pure predicates deciding whether a resource belongs to an application.
//! A selector-less application has no components: empty `matchLabels` and
//! empty `matchExpressions` both fail closed.

use crate::model::{AppResourceInfo, MatchExpression, Operator, ResourceInfo};
use crate::watcher::NamespaceFilter;
use std::collections::BTreeMap;

/// True when both label sets are present with identical pairs, or both absent
pub fn same_labels(
    labels1: Option<&BTreeMap<String, String>>,
    labels2: Option<&BTreeMap<String, String>>,
) -> bool {
    match (labels1, labels2) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// True when every required pair is present in `labels`.
///
/// An empty requirement never matches.
pub fn labels_match(
    match_labels: &BTreeMap<String, String>,
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    if match_labels.is_empty() {
        return false;
    }
    let Some(labels) = labels else {
        return false;
    };
    let matched = match_labels
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value));
    tracing::trace!("labels_match {:?} against {:?}: {}", match_labels, labels, matched);
    matched
}

/// True when `labels` satisfy every expression.
///
/// An empty expression list never matches, and neither does an unknown
/// operator.
pub fn expressions_match(
    expressions: &[MatchExpression],
    labels: Option<&BTreeMap<String, String>>,
) -> bool {
    if expressions.is_empty() {
        return false;
    }
    let matched = expressions.iter().all(|expr| {
        let value = labels.and_then(|l| l.get(&expr.key));
        match &expr.operator {
            Operator::In => value.is_some_and(|v| expr.values.contains(v)),
            Operator::NotIn => value.is_none_or(|v| !expr.values.contains(v)),
            Operator::Exists => value.is_some(),
            Operator::DoesNotExist => value.is_none(),
            Operator::Unknown(op) => {
                tracing::debug!("unsupported selector operator '{}' on key {}", op, expr.key);
                false
            }
        }
    });
    tracing::trace!("expressions_match {:?} against {:?}: {}", expressions, labels, matched);
    matched
}

/// Namespace rule for components.
///
/// Cluster-scoped resources are always eligible; otherwise the resource must
/// share the application's (permitted) namespace or sit in one of its
/// component namespaces.
pub fn namespace_matches(
    namespaces: &NamespaceFilter,
    app: &AppResourceInfo,
    namespace: &str,
) -> bool {
    if namespace.is_empty() {
        return true;
    }
    if app.namespace() == namespace && namespaces.is_namespace_permitted(namespace) {
        return true;
    }
    app.component_namespaces.contains(namespace)
}

/// True when `resource` is a component of `app`
pub fn resource_component_of_application(
    namespaces: &NamespaceFilter,
    app: &AppResourceInfo,
    resource: &ResourceInfo,
) -> bool {
    if !namespace_matches(namespaces, app, &resource.namespace) {
        tracing::trace!(
            "{}/{} not a component of {}/{}: namespace not eligible",
            resource.namespace,
            resource.name,
            app.namespace(),
            app.name()
        );
        return false;
    }
    if app.resource.is_same_resource(resource) {
        return false;
    }
    if !app
        .component_kinds
        .iter()
        .any(|gk| gk.kind == resource.kind)
    {
        return false;
    }

    let labels = resource.labels.as_ref();
    let has_labels = !app.match_labels.is_empty();
    let has_expressions = !app.match_expressions.is_empty();
    let matched = match (has_labels, has_expressions) {
        (true, true) => {
            labels_match(&app.match_labels, labels)
                && expressions_match(&app.match_expressions, labels)
        }
        (true, false) => labels_match(&app.match_labels, labels),
        (false, true) => expressions_match(&app.match_expressions, labels),
        (false, false) => false,
    };
    tracing::trace!(
        "{} {}/{} component of {}/{}: {}",
        resource.kind,
        resource.namespace,
        resource.name,
        app.namespace(),
        app.name(),
        matched
    );
    matched
}
