//! Sensu `core/v2` resources produced by the generator and read back by the reconciler.
//!
//! Only the fields the generator sets are modelled; anything else the backend returns
//! is ignored on deserialization.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Label the backend injects into every object it stores.
pub const MANAGED_BY_LABEL: &str = "sensu.io/managed_by";

/// Sensu serializes empty collections as `null` in some versions.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub labels: BTreeMap<String, String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        ObjectMeta {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Labels without the ones the backend adds on its own.
    pub fn user_labels(&self) -> BTreeMap<&str, &str> {
        self.labels
            .iter()
            .filter(|(key, _)| key.as_str() != MANAGED_BY_LABEL)
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }
}

/// Typed reference to another resource, as used by pipelines and checks.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ResourceRef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub api_version: String,
}

impl ResourceRef {
    pub fn pipeline(name: &str) -> Self {
        Self::core(name, "Pipeline")
    }

    pub fn filter(name: &str) -> Self {
        Self::core(name, "EventFilter")
    }

    pub fn handler(name: &str) -> Self {
        Self::core(name, "Handler")
    }

    fn core(name: &str, kind: &str) -> Self {
        ResourceRef {
            name: name.to_string(),
            kind: kind.to_string(),
            api_version: "core/v2".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProxyRequests {
    #[serde(default, deserialize_with = "null_as_default")]
    pub entity_attributes: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Check {
    pub command: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subscriptions: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub handlers: Vec<String>,
    pub interval: u64,
    #[serde(default)]
    pub timeout: u64,
    #[serde(default)]
    pub publish: bool,
    #[serde(default)]
    pub round_robin: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub pipelines: Vec<ResourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_requests: Option<ProxyRequests>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub runtime_assets: Vec<String>,
    pub metadata: ObjectMeta,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Entity {
    pub entity_class: String,
    pub metadata: ObjectMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subscriptions: Vec<String>,
}

impl Entity {
    pub const PROXY: &'static str = "proxy";
    pub const AGENT: &'static str = "agent";

    pub fn is_proxy(&self) -> bool {
        self.entity_class == Self::PROXY
    }

    pub fn is_agent(&self) -> bool {
        self.entity_class == Self::AGENT
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Handler {
    pub metadata: ObjectMeta,
    #[serde(rename = "type")]
    pub kind: String,
    pub command: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub runtime_assets: Vec<String>,
    #[serde(default)]
    pub timeout: u64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Filter {
    pub metadata: ObjectMeta,
    pub action: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub expressions: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<ResourceRef>,
    pub handler: ResourceRef,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Pipeline {
    pub metadata: ObjectMeta,
    #[serde(default, deserialize_with = "null_as_default")]
    pub workflows: Vec<Workflow>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EventEntity {
    #[serde(default)]
    pub entity_class: String,
    pub metadata: ObjectMeta,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct EventCheck {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub status: u32,
    #[serde(default)]
    pub output: String,
}

/// Result of one check execution against one entity. Never generated, only read.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Event {
    pub entity: EventEntity,
    pub check: EventCheck,
}

/// Silencing entry, named `<subscription>:<check>`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Silenced {
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
    #[serde(default)]
    pub expire_on_resolve: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Namespace {
    pub name: String,
}
