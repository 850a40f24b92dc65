//! Application resources
//!
//! An application selects its components by kind, label equality and
//! selector expressions. The parsed form is rebuilt from the live object on
//! every event and never cached.

use super::kind::{GroupKind, KindDescriptor};
use super::resource::ResourceInfo;
use crate::error::{Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::DynamicObject;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Default annotation listing extra namespaces components may come from
pub const COMPONENT_NAMESPACES_ANNOTATION: &str = "kappnav.component.namespaces";

/// Selector expression operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    /// Anything else the object declared; never matches
    Unknown(String),
}

impl From<&str> for Operator {
    fn from(op: &str) -> Self {
        match op {
            "In" => Operator::In,
            "NotIn" => Operator::NotIn,
            "Exists" => Operator::Exists,
            "DoesNotExist" => Operator::DoesNotExist,
            other => Operator::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::In => f.write_str("In"),
            Operator::NotIn => f.write_str("NotIn"),
            Operator::Exists => f.write_str("Exists"),
            Operator::DoesNotExist => f.write_str("DoesNotExist"),
            Operator::Unknown(op) => f.write_str(op),
        }
    }
}

/// One `matchExpressions` requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchExpression {
    pub key: String,
    pub operator: Operator,
    pub values: Vec<String>,
}

impl MatchExpression {
    pub fn new(key: &str, operator: Operator, values: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            operator,
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

/// Parsed application resource
#[derive(Debug, Clone, PartialEq)]
pub struct AppResourceInfo {
    pub resource: ResourceInfo,
    pub component_kinds: Vec<GroupKind>,
    pub match_labels: BTreeMap<String, String>,
    pub match_expressions: Vec<MatchExpression>,
    pub component_namespaces: BTreeSet<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationSpec {
    #[serde(default)]
    component_kinds: Vec<GroupKind>,
    #[serde(default)]
    selector: Option<LabelSelector>,
}

impl AppResourceInfo {
    /// Parse an application object.
    ///
    /// Fails when the object has no `spec`, or when `componentKinds` or
    /// `selector` do not have the expected shape.
    pub fn from_object(
        kind: &KindDescriptor,
        obj: &DynamicObject,
        namespaces_annotation: &str,
    ) -> Result<Self> {
        let resource = ResourceInfo::from_object(kind, obj)?;
        let parse_error = |reason: String| Error::Parse {
            key: resource.key().to_string(),
            reason,
        };

        let spec = obj
            .data
            .get("spec")
            .ok_or_else(|| parse_error("missing spec".to_string()))?;
        let spec: ApplicationSpec =
            serde_json::from_value(spec.clone()).map_err(|e| parse_error(e.to_string()))?;

        let selector = spec.selector.unwrap_or_default();
        let match_expressions = selector
            .match_expressions
            .unwrap_or_default()
            .into_iter()
            .map(|req| MatchExpression {
                key: req.key,
                operator: Operator::from(req.operator.as_str()),
                values: req.values.unwrap_or_default(),
            })
            .collect();

        let component_namespaces = obj
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(namespaces_annotation))
            .map(|value| parse_namespace_list(value))
            .unwrap_or_default();

        Ok(Self {
            resource,
            component_kinds: spec.component_kinds,
            match_labels: selector.match_labels.unwrap_or_default(),
            match_expressions,
            component_namespaces,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.resource.namespace
    }

    pub fn name(&self) -> &str {
        &self.resource.name
    }
}

/// Split a comma separated namespace annotation
fn parse_namespace_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string)
        .collect()
}
