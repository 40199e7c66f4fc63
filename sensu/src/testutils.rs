//! In-memory [`Backend`] recording every mutating call, for reconciliation tests.

use crate::backend::{Backend, Kind};
use crate::errors::SensuError;
use async_trait::async_trait;
use generator::records::MANAGED_BY_LABEL;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    CreateNamespace(String),
    Put { namespace: String, kind: Kind, name: String },
    Patch { namespace: String, kind: Kind, name: String, body: Value },
    Delete { namespace: String, kind: Kind, name: String },
    DeleteEvent { namespace: String, entity: String, check: String },
    Execute { namespace: String, check: String },
}

#[derive(Default)]
struct State {
    namespaces: Vec<String>,
    objects: BTreeMap<(String, Kind), BTreeMap<String, Value>>,
    ops: Vec<Op>,
    failing: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespaces(namespaces: &[&str]) -> Self {
        let backend = Self::new();
        backend.state.lock().namespaces = namespaces.iter().map(|ns| ns.to_string()).collect();
        backend
    }

    /// Seeds an object without recording an operation.
    pub fn insert(&self, namespace: &str, kind: Kind, value: Value) {
        let name = key(kind, &value);
        self.state
            .lock()
            .objects
            .entry((namespace.to_string(), kind))
            .or_default()
            .insert(name, value);
    }

    pub fn insert_as<T: Serialize>(&self, namespace: &str, kind: Kind, object: &T) {
        let value = serde_json::to_value(object).expect("serializable object");
        self.insert(namespace, kind, value);
    }

    pub fn object(&self, namespace: &str, kind: Kind, name: &str) -> Option<Value> {
        self.state
            .lock()
            .objects
            .get(&(namespace.to_string(), kind))
            .and_then(|objects| objects.get(name).cloned())
    }

    pub fn names(&self, namespace: &str, kind: Kind) -> Vec<String> {
        self.state
            .lock()
            .objects
            .get(&(namespace.to_string(), kind))
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.state.lock().namespaces.clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<Op> {
        std::mem::take(&mut self.state.lock().ops)
    }

    /// Makes every mutating call on objects (or namespaces) named `name` fail.
    pub fn fail_on(&self, name: &str) {
        self.state.lock().failing.insert(name.to_string());
    }

    fn check_failure(state: &State, method: Method, target: &str) -> Result<(), SensuError> {
        if state.failing.contains(target.rsplit('/').next().unwrap_or(target)) {
            return Err(SensuError::Status {
                method,
                url: format!("memory://{target}"),
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// Events are keyed `<entity>/<check>`, everything else by `metadata.name`.
fn key(kind: Kind, value: &Value) -> String {
    let name = |object: &Value| {
        object["metadata"]["name"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    };

    match kind {
        Kind::Events => format!("{}/{}", name(&value["entity"]), name(&value["check"])),
        _ => name(value),
    }
}

fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(fields) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        for (field, value) in fields {
            if value.is_null() {
                map.remove(field);
            } else {
                merge_patch(map.entry(field.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// What the real backend adds to an entity it stores.
fn decorate_entity(name: &str, value: &mut Value) {
    if let Some(labels) = value["metadata"]
        .as_object_mut()
        .map(|meta| meta.entry("labels").or_insert_with(|| Value::Object(Map::new())))
        && let Some(labels) = labels.as_object_mut()
    {
        labels
            .entry(MANAGED_BY_LABEL)
            .or_insert_with(|| Value::from("sensuctl"));
    }

    let own = Value::from(format!("entity:{name}"));
    if let Some(subscriptions) = value["subscriptions"].as_array_mut()
        && !subscriptions.contains(&own)
    {
        subscriptions.push(own);
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn namespaces(&self) -> Result<Vec<String>, SensuError> {
        Ok(self.state.lock().namespaces.clone())
    }

    async fn create_namespace(&self, name: &str) -> Result<(), SensuError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, Method::PUT, name)?;
        state.ops.push(Op::CreateNamespace(name.to_string()));
        if !state.namespaces.iter().any(|ns| ns == name) {
            state.namespaces.push(name.to_string());
        }
        Ok(())
    }

    async fn list(&self, namespace: &str, kind: Kind) -> Result<Vec<Value>, SensuError> {
        Ok(self
            .state
            .lock()
            .objects
            .get(&(namespace.to_string(), kind))
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, namespace: &str, kind: Kind, name: &str) -> Result<Value, SensuError> {
        self.object(namespace, kind, name)
            .ok_or_else(|| SensuError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })
    }

    async fn put(&self, namespace: &str, kind: Kind, name: &str, body: &Value) -> Result<(), SensuError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, Method::PUT, &format!("{namespace}/{kind}/{name}"))?;

        let mut value = body.clone();
        if kind == Kind::Entities {
            decorate_entity(name, &mut value);
        }

        state.ops.push(Op::Put {
            namespace: namespace.to_string(),
            kind,
            name: name.to_string(),
        });
        state
            .objects
            .entry((namespace.to_string(), kind))
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    async fn patch(&self, namespace: &str, kind: Kind, name: &str, body: &Value) -> Result<(), SensuError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, Method::PATCH, &format!("{namespace}/{kind}/{name}"))?;

        let object = state
            .objects
            .get_mut(&(namespace.to_string(), kind))
            .and_then(|objects| objects.get_mut(name))
            .ok_or_else(|| SensuError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })?;
        merge_patch(object, body);

        state.ops.push(Op::Patch {
            namespace: namespace.to_string(),
            kind,
            name: name.to_string(),
            body: body.clone(),
        });
        Ok(())
    }

    async fn delete(&self, namespace: &str, kind: Kind, name: &str) -> Result<(), SensuError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, Method::DELETE, &format!("{namespace}/{kind}/{name}"))?;

        state
            .objects
            .get_mut(&(namespace.to_string(), kind))
            .and_then(|objects| objects.remove(name))
            .ok_or_else(|| SensuError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            })?;

        state.ops.push(Op::Delete {
            namespace: namespace.to_string(),
            kind,
            name: name.to_string(),
        });
        Ok(())
    }

    async fn delete_event(&self, namespace: &str, entity: &str, check: &str) -> Result<(), SensuError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, Method::DELETE, &format!("{namespace}/events/{check}"))?;

        state
            .objects
            .get_mut(&(namespace.to_string(), Kind::Events))
            .and_then(|events| events.remove(&format!("{entity}/{check}")))
            .ok_or_else(|| SensuError::NotFound {
                kind: Kind::Events.to_string(),
                name: format!("{entity}/{check}"),
            })?;

        state.ops.push(Op::DeleteEvent {
            namespace: namespace.to_string(),
            entity: entity.to_string(),
            check: check.to_string(),
        });
        Ok(())
    }

    async fn execute(&self, namespace: &str, check: &str) -> Result<(), SensuError> {
        let mut state = self.state.lock();
        Self::check_failure(&state, Method::POST, &format!("{namespace}/checks/{check}"))?;
        state.ops.push(Op::Execute {
            namespace: namespace.to_string(),
            check: check.to_string(),
        });
        Ok(())
    }
}
