use crate::errors::SensuError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Namespaced resource collections of the `core/v2` API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Checks,
    Entities,
    Events,
    Filters,
    Handlers,
    Pipelines,
    Silenced,
}

impl Kind {
    pub const fn path(&self) -> &'static str {
        match self {
            Kind::Checks => "checks",
            Kind::Entities => "entities",
            Kind::Events => "events",
            Kind::Filters => "filters",
            Kind::Handlers => "handlers",
            Kind::Pipelines => "pipelines",
            Kind::Silenced => "silenced",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Operations the reconciler and the CLI need from a Sensu backend.
///
/// Objects travel as JSON so that fields this crate does not model survive a
/// read-modify-write.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn namespaces(&self) -> Result<Vec<String>, SensuError>;

    async fn create_namespace(&self, name: &str) -> Result<(), SensuError>;

    async fn list(&self, namespace: &str, kind: Kind) -> Result<Vec<Value>, SensuError>;

    async fn get(&self, namespace: &str, kind: Kind, name: &str) -> Result<Value, SensuError>;

    /// Creates or replaces an object.
    async fn put(&self, namespace: &str, kind: Kind, name: &str, body: &Value) -> Result<(), SensuError>;

    /// Applies a JSON merge patch.
    async fn patch(&self, namespace: &str, kind: Kind, name: &str, body: &Value) -> Result<(), SensuError>;

    async fn delete(&self, namespace: &str, kind: Kind, name: &str) -> Result<(), SensuError>;

    async fn delete_event(&self, namespace: &str, entity: &str, check: &str) -> Result<(), SensuError>;

    /// Requests an immediate execution of a check.
    async fn execute(&self, namespace: &str, check: &str) -> Result<(), SensuError>;
}

/// Lists `kind` and decodes every object as `T`.
pub async fn list_as<T: DeserializeOwned>(
    backend: &dyn Backend,
    namespace: &str,
    kind: Kind,
) -> Result<Vec<T>, SensuError> {
    backend
        .list(namespace, kind)
        .await?
        .into_iter()
        .map(|value| serde_json::from_value(value).map_err(SensuError::from))
        .collect()
}

pub async fn get_as<T: DeserializeOwned>(
    backend: &dyn Backend,
    namespace: &str,
    kind: Kind,
    name: &str,
) -> Result<T, SensuError> {
    Ok(serde_json::from_value(backend.get(namespace, kind, name).await?)?)
}
