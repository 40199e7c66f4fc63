//! Converges one namespace of the backend onto a [`NamespacePlan`].
//!
//! Objects are applied in dependency order so that no check ever references a
//! handler, filter or pipeline that does not exist yet:
//!
//! 1. `daily` filter, `slack` handler, `reduce_alerts` pipeline
//! 2. publisher handler, `hard-state` filter, `hard_state` pipeline
//! 3. checks, created and updated before stale ones are deleted
//! 4. events of checks that no longer exist
//! 5. agent CPU and memory checks
//! 6. proxy entities
//! 7. agent subscriptions, only ever extended
//! 8. routing objects no longer wanted
//!
//! A rejected create, update or delete is logged and counted, and the pass goes
//! on. Failing to list a collection aborts the namespace.

use crate::backend::{Backend, Kind, list_as};
use crate::errors::{ReconcileError, SensuError};
use crate::metrics_defs::{
    EVENTS_DELETED, OBJECTS_CREATED, OBJECTS_DELETED, OBJECTS_FAILED, OBJECTS_UPDATED,
};
use crate::resource::Resource;
use generator::NamespacePlan;
use generator::checks::REDUCE_ALERTS_PIPELINE;
use generator::internals::{self, CPU_CHECK, DAILY_FILTER, MEMORY_CHECK, SLACK_HANDLER};
use generator::records::{Check, Entity, Event, Filter, Handler, Pipeline};
use serde_json::json;
use shared::counter;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Events of this check belong to the agents themselves.
const KEEPALIVE: &str = "keepalive";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub events_deleted: usize,
}

impl ReconcileSummary {
    /// True when the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created + self.updated + self.deleted + self.events_deleted == 0
    }
}

impl fmt::Display for ReconcileSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} events deleted, {} failed",
            self.created, self.updated, self.deleted, self.events_deleted, self.failed
        )
    }
}

pub struct Reconciler {
    backend: Arc<dyn Backend>,
}

impl Reconciler {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Reconciler { backend }
    }

    /// Creates the namespaces missing from the backend.
    ///
    /// Any failure here concerns the whole backend, so it is returned as fatal.
    pub async fn ensure_namespaces(&self, wanted: &[&str]) -> Result<(), ReconcileError> {
        let existing = self
            .backend
            .namespaces()
            .await
            .map_err(ReconcileError::Namespaces)?;

        for namespace in wanted {
            if existing.iter().any(|ns| ns == namespace) {
                continue;
            }

            self.backend
                .create_namespace(namespace)
                .await
                .map_err(|source| ReconcileError::NamespaceBootstrap {
                    namespace: namespace.to_string(),
                    source,
                })?;
            tracing::info!("{namespace}: Namespace created");
        }

        Ok(())
    }

    pub async fn apply(&self, plan: &NamespacePlan) -> Result<ReconcileSummary, ReconcileError> {
        let ns = plan.namespace.as_str();
        let backend = self.backend.as_ref();
        let internal = &plan.internal;
        let mut summary = ReconcileSummary::default();

        let live_filters: Vec<Filter> = list_as(backend, ns, Kind::Filters).await?;
        let live_handlers: Vec<Handler> = list_as(backend, ns, Kind::Handlers).await?;
        let live_pipelines: Vec<Pipeline> = list_as(backend, ns, Kind::Pipelines).await?;

        self.converge(ns, named(&internal.filters, DAILY_FILTER), &live_filters, &mut summary)
            .await;
        self.converge(ns, named(&internal.handlers, SLACK_HANDLER), &live_handlers, &mut summary)
            .await;
        self.converge(
            ns,
            named(&internal.pipelines, REDUCE_ALERTS_PIPELINE),
            &live_pipelines,
            &mut summary,
        )
        .await;

        self.converge(ns, except(&internal.handlers, SLACK_HANDLER), &live_handlers, &mut summary)
            .await;
        self.converge(ns, except(&internal.filters, DAILY_FILTER), &live_filters, &mut summary)
            .await;
        self.converge(
            ns,
            except(&internal.pipelines, REDUCE_ALERTS_PIPELINE),
            &live_pipelines,
            &mut summary,
        )
        .await;

        let live_checks: Vec<Check> = list_as(backend, ns, Kind::Checks).await?;
        self.converge(ns, &plan.checks, &live_checks, &mut summary).await;

        let live_entities: Vec<Entity> = list_as(backend, ns, Kind::Entities).await?;
        let agents: Vec<&Entity> = live_entities.iter().filter(|e| e.is_agent()).collect();

        // Agent checks are only wanted while there is an agent to run them.
        let mut wanted_checks = names(&plan.checks);
        if !agents.is_empty() {
            wanted_checks.extend([CPU_CHECK, MEMORY_CHECK]);
        }
        self.prune(ns, &wanted_checks, &live_checks, &mut summary).await;

        self.delete_orphaned_events(ns, &mut summary).await?;

        if agents.is_empty() {
            tracing::debug!("{ns}: No agents found, skipping agent checks");
        } else {
            let agent_names: Vec<String> =
                agents.iter().map(|a| a.metadata.name.clone()).collect();
            let agent_checks = internals::agent_checks(ns, &agent_names);
            self.converge(ns, &agent_checks, &live_checks, &mut summary).await;
        }

        let live_proxies: Vec<Entity> = live_entities
            .iter()
            .filter(|e| e.is_proxy())
            .cloned()
            .collect();
        self.converge(ns, &plan.entities, &live_proxies, &mut summary).await;
        self.prune(ns, &names(&plan.entities), &live_proxies, &mut summary).await;

        for agent in agents {
            self.extend_subscriptions(ns, agent, plan, &mut summary).await;
        }

        self.prune(ns, &names(&internal.pipelines), &live_pipelines, &mut summary)
            .await;
        self.prune(ns, &names(&internal.filters), &live_filters, &mut summary)
            .await;
        self.prune(ns, &names(&internal.handlers), &live_handlers, &mut summary)
            .await;

        if summary.is_noop() {
            tracing::info!("{ns}: Configuration up to date");
        } else {
            tracing::info!("{ns}: Configuration applied: {summary}");
        }

        Ok(summary)
    }

    /// Creates missing objects and updates drifted ones.
    async fn converge<'a, T: Resource + 'a>(
        &self,
        ns: &str,
        desired: impl IntoIterator<Item = &'a T>,
        live: &[T],
        summary: &mut ReconcileSummary,
    ) {
        for object in desired {
            let name = object.name();
            let existing = live.iter().find(|l| l.name() == name);

            match existing {
                None => match self.put(ns, object).await {
                    Ok(()) => {
                        tracing::info!("{ns}: {} {name} created", T::LABEL);
                        summary.created += 1;
                        counter!(OBJECTS_CREATED, "kind" => T::KIND.path()).increment(1);
                    }
                    Err(e) => failed(ns, "creating", T::LABEL, T::KIND, name, &e, summary),
                },
                Some(existing) if object.converged(existing) => {}
                Some(_) => {
                    let result = match object.update_patch() {
                        Some(patch) => self.backend.patch(ns, T::KIND, name, &patch).await,
                        None => self.put(ns, object).await,
                    };

                    match result {
                        Ok(()) => {
                            tracing::info!("{ns}: {} {name} updated", T::LABEL);
                            summary.updated += 1;
                            counter!(OBJECTS_UPDATED, "kind" => T::KIND.path()).increment(1);
                        }
                        Err(e) => failed(ns, "updating", T::LABEL, T::KIND, name, &e, summary),
                    }
                }
            }
        }
    }

    /// Deletes live objects not in `wanted`.
    async fn prune<T: Resource>(
        &self,
        ns: &str,
        wanted: &HashSet<&str>,
        live: &[T],
        summary: &mut ReconcileSummary,
    ) {
        for object in live.iter().filter(|l| !wanted.contains(l.name())) {
            let name = object.name();
            match self.backend.delete(ns, T::KIND, name).await {
                Ok(()) => {
                    tracing::info!("{ns}: {} {name} removed", T::LABEL);
                    summary.deleted += 1;
                    counter!(OBJECTS_DELETED, "kind" => T::KIND.path()).increment(1);
                }
                Err(e) => failed(ns, "removing", T::LABEL, T::KIND, name, &e, summary),
            }
        }
    }

    async fn put<T: Resource>(&self, ns: &str, object: &T) -> Result<(), SensuError> {
        let body = serde_json::to_value(object)?;
        self.backend.put(ns, T::KIND, object.name(), &body).await
    }

    /// Deletes events whose check is gone, except agent keepalives.
    async fn delete_orphaned_events(
        &self,
        ns: &str,
        summary: &mut ReconcileSummary,
    ) -> Result<(), ReconcileError> {
        let backend = self.backend.as_ref();
        let checks: Vec<Check> = list_as(backend, ns, Kind::Checks).await?;
        let remaining: HashSet<&str> = checks.iter().map(|c| c.metadata.name.as_str()).collect();
        let events: Vec<Event> = list_as(backend, ns, Kind::Events).await?;

        for event in &events {
            let check = event.check.metadata.name.as_str();
            let entity = event.entity.metadata.name.as_str();
            if check == KEEPALIVE || remaining.contains(check) {
                continue;
            }

            match backend.delete_event(ns, entity, check).await {
                Ok(()) => {
                    tracing::info!("{ns}: Event {entity}/{check} removed");
                    summary.events_deleted += 1;
                    counter!(EVENTS_DELETED).increment(1);
                }
                Err(e) => {
                    tracing::warn!("{ns}: Error removing event {entity}/{check}: {e}");
                    summary.failed += 1;
                    counter!(OBJECTS_FAILED, "kind" => Kind::Events.path()).increment(1);
                }
            }
        }

        Ok(())
    }

    /// Adds the subscriptions an agent is missing, keeping the ones it has.
    async fn extend_subscriptions(
        &self,
        ns: &str,
        agent: &Entity,
        plan: &NamespacePlan,
        summary: &mut ReconcileSummary,
    ) {
        let name = agent.metadata.name.as_str();
        let extras = plan.agent_extras.get(name).into_iter().flatten();

        let mut subscriptions = agent.subscriptions.clone();
        for required in plan.agent_subscriptions.iter().chain(extras) {
            if !subscriptions.contains(required) {
                subscriptions.push(required.clone());
            }
        }

        if subscriptions == agent.subscriptions {
            return;
        }

        let patch = json!({ "subscriptions": subscriptions });
        match self.backend.patch(ns, Kind::Entities, name, &patch).await {
            Ok(()) => {
                tracing::info!("{ns}: Agent {name} subscriptions updated");
                summary.updated += 1;
                counter!(OBJECTS_UPDATED, "kind" => Kind::Entities.path()).increment(1);
            }
            Err(e) => failed(ns, "updating", "Agent", Kind::Entities, name, &e, summary),
        }
    }
}

fn failed(
    ns: &str,
    action: &str,
    label: &str,
    kind: Kind,
    name: &str,
    error: &SensuError,
    summary: &mut ReconcileSummary,
) {
    tracing::warn!("{ns}: Error {action} {label} {name}: {error}");
    summary.failed += 1;
    counter!(OBJECTS_FAILED, "kind" => kind.path()).increment(1);
}

fn named<'a, T: Resource>(items: &'a [T], name: &'a str) -> impl Iterator<Item = &'a T> {
    items.iter().filter(move |item| item.name() == name)
}

fn except<'a, T: Resource>(items: &'a [T], name: &'a str) -> impl Iterator<Item = &'a T> {
    items.iter().filter(move |item| item.name() != name)
}

fn names<T: Resource>(items: &[T]) -> HashSet<&str> {
    items.iter().map(Resource::name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MemoryBackend, Op};
    use generator::internals::InternalServices;
    use generator::records::{EventCheck, EventEntity, ObjectMeta, ProxyRequests, ResourceRef};

    const NS: &str = "TENANT1";

    fn check(name: &str, subscriptions: &[&str]) -> Check {
        Check {
            command: format!("/usr/lib64/nagios/plugins/check_{name} -H {{{{ .labels.hostname }}}}"),
            subscriptions: subscriptions.iter().map(|s| s.to_string()).collect(),
            handlers: vec![],
            interval: 300,
            timeout: 900,
            publish: true,
            round_robin: false,
            pipelines: vec![ResourceRef::pipeline(REDUCE_ALERTS_PIPELINE)],
            proxy_requests: Some(ProxyRequests {
                entity_attributes: vec!["entity.entity_class == 'proxy'".into()],
            }),
            runtime_assets: vec![],
            metadata: ObjectMeta {
                annotations: [("attempts".to_string(), "3".to_string())].into(),
                ..ObjectMeta::new(name, NS)
            },
        }
    }

    fn proxy(service: &str, hostname: &str) -> Entity {
        let mut metadata = ObjectMeta::new(format!("{service}__{hostname}"), NS);
        metadata.labels.insert("hostname".into(), hostname.into());
        Entity {
            entity_class: Entity::PROXY.into(),
            metadata,
            subscriptions: vec![service.into()],
        }
    }

    fn agent(name: &str, subscriptions: &[&str]) -> Entity {
        Entity {
            entity_class: Entity::AGENT.into(),
            metadata: ObjectMeta::new(name, NS),
            subscriptions: subscriptions.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn event(entity: &str, check: &str) -> Event {
        Event {
            entity: EventEntity {
                entity_class: Entity::PROXY.into(),
                metadata: ObjectMeta::new(entity, NS),
            },
            check: EventCheck {
                metadata: ObjectMeta::new(check, NS),
                status: 0,
                output: "OK".into(),
            },
        }
    }

    fn plan(checks: Vec<Check>, entities: Vec<Entity>) -> NamespacePlan {
        NamespacePlan {
            namespace: NS.into(),
            tenants: vec![NS.into()],
            checks,
            entities,
            internal: InternalServices::build(NS, false, None, None),
            ..Default::default()
        }
    }

    fn reconciler(backend: &Arc<MemoryBackend>) -> Reconciler {
        Reconciler::new(backend.clone())
    }

    fn mutated(ops: &[Op]) -> Vec<(Kind, String)> {
        ops.iter()
            .filter_map(|op| match op {
                Op::Put { kind, name, .. }
                | Op::Patch { kind, name, .. }
                | Op::Delete { kind, name, .. } => Some((*kind, name.clone())),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_apply_order() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        backend.insert_as(NS, Kind::Entities, &agent("sensu-agent1", &["entity:sensu-agent1"]));

        let mut plan = plan(
            vec![check("generic.tcp.connect", &["argo.webui"])],
            vec![proxy("argo.webui", "argo.ni4os.eu")],
        );
        plan.internal = InternalServices::build(NS, true, None, None);
        plan.agent_subscriptions = vec!["argo.webui".into()];

        let summary = reconciler(&backend).apply(&plan).await.unwrap();

        assert_eq!(
            mutated(&backend.ops()),
            vec![
                (Kind::Filters, "daily".into()),
                (Kind::Handlers, "slack".into()),
                (Kind::Pipelines, "reduce_alerts".into()),
                (Kind::Handlers, "publisher-handler".into()),
                (Kind::Filters, "hard-state".into()),
                (Kind::Pipelines, "hard_state".into()),
                (Kind::Checks, "generic.tcp.connect".into()),
                (Kind::Checks, CPU_CHECK.into()),
                (Kind::Checks, MEMORY_CHECK.into()),
                (Kind::Entities, "argo.webui__argo.ni4os.eu".into()),
                (Kind::Entities, "sensu-agent1".into()),
            ]
        );
        assert_eq!(summary.created, 10);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_second_pass_is_noop() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        backend.insert_as(
            NS,
            Kind::Entities,
            &agent("sensu-agent1", &["entity:sensu-agent1", "argo.webui"]),
        );

        let mut plan = plan(
            vec![
                check("generic.tcp.connect", &["argo.webui", "eu.argo.ams"]),
                check("generic.http.connect", &["argo.webui"]),
            ],
            vec![
                proxy("argo.webui", "argo.ni4os.eu"),
                proxy("eu.argo.ams", "msg.argo.grnet.gr"),
            ],
        );
        plan.agent_subscriptions = vec!["argo.webui".into(), "eu.argo.ams".into()];
        plan.agent_extras
            .insert("sensu-agent1".into(), vec!["argo.test".into()]);

        let reconciler = reconciler(&backend);
        let first = reconciler.apply(&plan).await.unwrap();
        assert!(!first.is_noop());
        backend.take_ops();

        let second = reconciler.apply(&plan).await.unwrap();
        assert!(second.is_noop(), "{second}");
        assert!(backend.ops().is_empty(), "{:?}", backend.ops());
    }

    #[tokio::test]
    async fn test_event_cascade() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        let reconciler = reconciler(&backend);

        let both = plan(vec![check("A", &["S1"]), check("B", &["S1"])], vec![]);
        reconciler.apply(&both).await.unwrap();

        backend.insert_as(NS, Kind::Events, &event("host1", "A"));
        backend.insert_as(NS, Kind::Events, &event("host2", "B"));
        backend.insert_as(NS, Kind::Events, &event("sensu-agent1", KEEPALIVE));

        let only_a = plan(vec![check("A", &["S1"])], vec![]);
        let summary = reconciler.apply(&only_a).await.unwrap();

        assert_eq!(backend.names(NS, Kind::Checks), vec!["A"]);
        assert_eq!(
            backend.names(NS, Kind::Events),
            vec!["host1/A", "sensu-agent1/keepalive"]
        );
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.events_deleted, 1);
    }

    #[tokio::test]
    async fn test_agent_subscriptions_are_extended() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        backend.insert_as(
            NS,
            Kind::Entities,
            &agent("sensu-agent1", &["entity:sensu-agent1", "argo.webui"]),
        );

        let mut plan = plan(vec![], vec![]);
        plan.agent_subscriptions = vec!["argo.test".into()];

        reconciler(&backend).apply(&plan).await.unwrap();

        let patches: Vec<_> = backend
            .ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Patch { name, body, .. } => Some((name, body)),
                _ => None,
            })
            .collect();
        assert_eq!(
            patches,
            vec![(
                "sensu-agent1".to_string(),
                json!({"subscriptions": ["entity:sensu-agent1", "argo.webui", "argo.test"]})
            )]
        );
    }

    #[tokio::test]
    async fn test_handler_drift_is_patched() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        let reconciler = reconciler(&backend);

        let mut plan = plan(vec![], vec![]);
        reconciler.apply(&plan).await.unwrap();
        backend.take_ops();

        plan.internal = InternalServices::build(NS, false, None, Some("/etc/sensu/secrets"));
        let summary = reconciler.apply(&plan).await.unwrap();

        assert_eq!(summary.updated, 1);
        let ops = backend.ops();
        assert_eq!(ops.len(), 1);
        match &ops[0] {
            Op::Patch { kind, name, body, .. } => {
                assert_eq!(*kind, Kind::Handlers);
                assert_eq!(name, "slack");
                assert_eq!(body.as_object().unwrap().len(), 1);
                assert!(body["command"].as_str().unwrap().starts_with("source /etc/sensu/secrets;"));
            }
            other => panic!("unexpected op {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_check_update_and_stale_entities() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        let reconciler = reconciler(&backend);

        let first = plan(
            vec![check("A", &["S1"])],
            vec![proxy("S1", "host1"), proxy("S1", "host2")],
        );
        reconciler.apply(&first).await.unwrap();
        backend.insert_as(NS, Kind::Entities, &agent("sensu-agent1", &[]));
        backend.take_ops();

        let mut changed = check("A", &["S1"]);
        changed.interval = 600;
        let second = plan(vec![changed], vec![proxy("S1", "host1")]);
        let summary = reconciler.apply(&second).await.unwrap();

        assert_eq!(summary.updated, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(
            backend.names(NS, Kind::Entities),
            vec!["S1__host1", "sensu-agent1"]
        );
        let stored = backend.object(NS, Kind::Checks, "A").unwrap();
        assert_eq!(stored["interval"], 600);
    }

    #[tokio::test]
    async fn test_failed_object_does_not_stop_pass() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        backend.fail_on("A");

        let summary = reconciler(&backend)
            .apply(&plan(vec![check("A", &["S1"]), check("B", &["S1"])], vec![]))
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(backend.names(NS, Kind::Checks), vec!["B"]);
    }

    #[tokio::test]
    async fn test_no_agents_no_agent_checks() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        reconciler(&backend)
            .apply(&plan(vec![check("A", &["S1"])], vec![]))
            .await
            .unwrap();

        assert_eq!(backend.names(NS, Kind::Checks), vec!["A"]);
    }

    #[tokio::test]
    async fn test_agent_checks_removed_with_last_agent() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        backend.insert_as(NS, Kind::Entities, &agent("sensu-agent1", &["entity:sensu-agent1"]));
        let reconciler = reconciler(&backend);

        let plan = plan(vec![], vec![]);
        reconciler.apply(&plan).await.unwrap();
        assert_eq!(
            backend.names(NS, Kind::Checks),
            vec![CPU_CHECK, MEMORY_CHECK]
        );
        backend.insert_as(NS, Kind::Events, &event("sensu-agent1", CPU_CHECK));

        backend
            .delete(NS, Kind::Entities, "sensu-agent1")
            .await
            .unwrap();
        backend.take_ops();

        let summary = reconciler.apply(&plan).await.unwrap();

        assert!(backend.names(NS, Kind::Checks).is_empty());
        assert!(backend.names(NS, Kind::Events).is_empty());
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.events_deleted, 1);

        // Nothing left to remove on the next pass.
        assert!(reconciler.apply(&plan).await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_stale_routing_objects_removed() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&[NS]));
        let reconciler = reconciler(&backend);

        let mut publishing = plan(vec![], vec![]);
        publishing.internal = InternalServices::build(NS, true, None, None);
        reconciler.apply(&publishing).await.unwrap();
        backend.take_ops();

        let summary = reconciler.apply(&plan(vec![], vec![])).await.unwrap();

        assert_eq!(summary.deleted, 3);
        assert_eq!(backend.names(NS, Kind::Handlers), vec!["slack"]);
        assert_eq!(backend.names(NS, Kind::Filters), vec!["daily"]);
        assert_eq!(backend.names(NS, Kind::Pipelines), vec!["reduce_alerts"]);
    }

    #[tokio::test]
    async fn test_ensure_namespaces() {
        let backend = Arc::new(MemoryBackend::with_namespaces(&["default", NS]));
        let reconciler = reconciler(&backend);

        reconciler.ensure_namespaces(&[NS, "custom"]).await.unwrap();
        assert_eq!(backend.ops(), vec![Op::CreateNamespace("custom".into())]);

        backend.fail_on("broken");
        let err = reconciler.ensure_namespaces(&["broken"]).await.unwrap_err();
        assert!(err.is_fatal());
    }
}
