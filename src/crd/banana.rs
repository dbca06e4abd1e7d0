//! Banana Custom Resource Definition

use std::fmt;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Banana resource specification
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "fruits.com",
    version = "v1",
    kind = "Banana",
    plural = "bananas",
    singular = "banana",
    shortname = "bn",
    namespaced,
    status = "BananaStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name": "Color", "type": "string", "jsonPath": ".spec.color"}"#,
    printcolumn = r#"{"name": "Painted", "type": "string", "jsonPath": ".status.color"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BananaSpec {
    /// Color the banana should be painted
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
}

/// Banana status
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BananaStatus {
    /// Color the banana has actually been painted
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub color: String,
}

impl BananaSpec {
    pub fn new(color: impl Into<String>) -> Self {
        Self {
            color: color.into(),
        }
    }
}

impl Banana {
    /// Desired color from the spec
    pub fn desired_color(&self) -> &str {
        &self.spec.color
    }

    /// Observed color; an absent status reads as unpainted
    pub fn observed_color(&self) -> &str {
        self.status.as_ref().map(|s| s.color.as_str()).unwrap_or("")
    }

    /// Whether the observed color already matches the desired one
    pub fn is_converged(&self) -> bool {
        self.desired_color() == self.observed_color()
    }

    /// Whether the owner has asked for deletion
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}

/// Namespace + name key of a Banana record
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity {
    pub namespace: String,
    pub name: String,
}

impl Identity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of an existing record
    pub fn of(banana: &Banana) -> Self {
        Self {
            namespace: banana.namespace().unwrap_or_else(|| "default".to_string()),
            name: banana.name_any(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
