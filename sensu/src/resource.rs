//! Identity and drift detection for the object kinds the reconciler manages.

use crate::backend::Kind;
use generator::records::{Check, Entity, Filter, Handler, Pipeline};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;

pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync {
    const KIND: Kind;
    /// Singular name used in log lines.
    const LABEL: &'static str;

    fn name(&self) -> &str;

    /// Whether `live` already matches this desired object.
    fn converged(&self, live: &Self) -> bool;

    /// Merge patch to send instead of replacing the whole object on drift.
    fn update_patch(&self) -> Option<serde_json::Value> {
        None
    }
}

fn as_set(items: &[String]) -> BTreeSet<&str> {
    items.iter().map(String::as_str).collect()
}

impl Resource for Check {
    const KIND: Kind = Kind::Checks;
    const LABEL: &'static str = "Check";

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn converged(&self, live: &Self) -> bool {
        let attributes = |check: &Check| {
            check
                .proxy_requests
                .as_ref()
                .map(|p| p.entity_attributes.clone())
                .unwrap_or_default()
        };

        self.command == live.command
            && as_set(&self.subscriptions) == as_set(&live.subscriptions)
            && as_set(&self.handlers) == as_set(&live.handlers)
            && attributes(self) == attributes(live)
            && self.interval == live.interval
            && self.timeout == live.timeout
            && self.publish == live.publish
            && self.metadata.name == live.metadata.name
            && self.metadata.namespace == live.metadata.namespace
            && self.round_robin == live.round_robin
            && self.pipelines == live.pipelines
            && self.metadata.annotations == live.metadata.annotations
    }
}

impl Resource for Entity {
    const KIND: Kind = Kind::Entities;
    const LABEL: &'static str = "Entity";

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn converged(&self, live: &Self) -> bool {
        // The backend subscribes every entity to its own `entity:<name>`.
        let own = format!("entity:{}", live.metadata.name);
        let live_subscriptions: BTreeSet<&str> = live
            .subscriptions
            .iter()
            .map(String::as_str)
            .filter(|s| *s != own)
            .collect();

        self.metadata.name == live.metadata.name
            && self.metadata.namespace == live.metadata.namespace
            && self.metadata.user_labels() == live.metadata.user_labels()
            && as_set(&self.subscriptions) == live_subscriptions
    }
}

impl Resource for Handler {
    const KIND: Kind = Kind::Handlers;
    const LABEL: &'static str = "Handler";

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn converged(&self, live: &Self) -> bool {
        self.command == live.command
    }

    fn update_patch(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "command": self.command }))
    }
}

impl Resource for Filter {
    const KIND: Kind = Kind::Filters;
    const LABEL: &'static str = "Filter";

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn converged(&self, live: &Self) -> bool {
        self.expressions == live.expressions
    }
}

impl Resource for Pipeline {
    const KIND: Kind = Kind::Pipelines;
    const LABEL: &'static str = "Pipeline";

    fn name(&self) -> &str {
        &self.metadata.name
    }

    fn converged(&self, live: &Self) -> bool {
        self.workflows == live.workflows
    }
}
