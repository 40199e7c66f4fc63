//! Fixed objects every namespace needs: alert routing and agent health checks.

use crate::checks::{CHECK_TIMEOUT, PUBLISHER_HANDLER, REDUCE_ALERTS_PIPELINE};
use crate::command::secrets_prefix;
use crate::records::{Check, Filter, Handler, ObjectMeta, Pipeline, ResourceRef, Workflow};

pub const DAILY_FILTER: &str = "daily";
pub const HARD_STATE_FILTER: &str = "hard-state";
pub const INCIDENT_FILTER: &str = "is_incident";
pub const SLACK_HANDLER: &str = "slack";
pub const HARD_STATE_PIPELINE: &str = "hard_state";

pub const CPU_CHECK: &str = "sensu.cpu.usage";
pub const MEMORY_CHECK: &str = "sensu.memory.usage";

pub const DEFAULT_PUBLISHER_QUEUE: &str = "/var/spool/argo/metrics";
const PUBLISHER_COMMAND: &str = "/usr/bin/scg publish";

const DAILY_EXPRESSION: &str = "((event.check.occurrences == 1 && event.check.status == 0 && \
    event.check.occurrences_watermark >= Number(event.check.annotations.attempts)) || \
    (event.check.occurrences == Number(event.check.annotations.attempts) && event.check.status != 0)) || \
    (event.check.occurrences % (86400 / event.check.interval) == 0)";

const HARD_STATE_EXPRESSION: &str = "((event.check.status == 0) || \
    (event.check.occurrences >= Number(event.check.annotations.attempts) && event.check.status != 0))";

/// Filters, handlers and pipelines in the order they must exist in the backend.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InternalServices {
    pub filters: Vec<Filter>,
    pub handlers: Vec<Handler>,
    pub pipelines: Vec<Pipeline>,
}

impl InternalServices {
    pub fn build(
        namespace: &str,
        publish: bool,
        publisher_queue: Option<&str>,
        secrets: Option<&str>,
    ) -> Self {
        let mut services = InternalServices {
            filters: vec![filter(namespace, DAILY_FILTER, DAILY_EXPRESSION)],
            handlers: vec![slack_handler(namespace, secrets)],
            pipelines: vec![pipeline(
                namespace,
                REDUCE_ALERTS_PIPELINE,
                "slack_alerts",
                &[INCIDENT_FILTER, DAILY_FILTER],
                SLACK_HANDLER,
            )],
        };

        if publish {
            services.handlers.push(publisher_handler(namespace, publisher_queue));
            services
                .filters
                .push(filter(namespace, HARD_STATE_FILTER, HARD_STATE_EXPRESSION));
            services.pipelines.push(pipeline(
                namespace,
                HARD_STATE_PIPELINE,
                "mimic_hard_state",
                &[HARD_STATE_FILTER],
                PUBLISHER_HANDLER,
            ));
        }

        services
    }

    /// Adds the objects of `other` whose names are not present yet.
    pub fn extend(&mut self, other: InternalServices) {
        fn absorb<T>(into: &mut Vec<T>, from: Vec<T>, name: impl Fn(&T) -> &str) {
            for item in from {
                if !into.iter().any(|existing| name(existing) == name(&item)) {
                    into.push(item);
                }
            }
        }

        absorb(&mut self.filters, other.filters, |f| f.metadata.name.as_str());
        absorb(&mut self.handlers, other.handlers, |h| h.metadata.name.as_str());
        absorb(&mut self.pipelines, other.pipelines, |p| p.metadata.name.as_str());
    }
}

fn filter(namespace: &str, name: &str, expression: &str) -> Filter {
    Filter {
        metadata: ObjectMeta::new(name, namespace),
        action: "allow".to_string(),
        expressions: vec![expression.to_string()],
    }
}

fn pipeline(namespace: &str, name: &str, workflow: &str, filters: &[&str], handler: &str) -> Pipeline {
    Pipeline {
        metadata: ObjectMeta::new(name, namespace),
        workflows: vec![Workflow {
            name: workflow.to_string(),
            filters: filters.iter().map(|f| ResourceRef::filter(f)).collect(),
            handler: ResourceRef::handler(handler),
        }],
    }
}

fn slack_handler(namespace: &str, secrets: Option<&str>) -> Handler {
    let command = "sensu-slack-handler --channel '#monitoring'";

    Handler {
        metadata: ObjectMeta::new(SLACK_HANDLER, namespace),
        kind: "pipe".to_string(),
        command: match secrets {
            Some(secrets) => format!("{}{command}", secrets_prefix(secrets)),
            None => command.to_string(),
        },
        runtime_assets: vec!["sensu-slack-handler".to_string()],
        timeout: 0,
    }
}

fn publisher_handler(namespace: &str, queue: Option<&str>) -> Handler {
    Handler {
        metadata: ObjectMeta::new(PUBLISHER_HANDLER, namespace),
        kind: "pipe".to_string(),
        command: format!(
            "{PUBLISHER_COMMAND} --queue {}",
            queue.unwrap_or(DEFAULT_PUBLISHER_QUEUE)
        ),
        runtime_assets: vec![],
        timeout: 0,
    }
}

/// CPU and memory checks of the agents themselves, one `entity:<agent>` subscription per agent.
pub fn agent_checks(namespace: &str, agents: &[String]) -> Vec<Check> {
    let subscriptions: Vec<String> = agents.iter().map(|agent| format!("entity:{agent}")).collect();

    [
        (CPU_CHECK, "check-cpu-usage -w 85 -c 90", "check-cpu-usage"),
        (MEMORY_CHECK, "check-memory-usage -w 85 -c 90", "check-memory-usage"),
    ]
    .into_iter()
    .map(|(name, command, asset)| Check {
        command: command.to_string(),
        subscriptions: subscriptions.clone(),
        handlers: vec![],
        interval: 300,
        timeout: CHECK_TIMEOUT,
        publish: true,
        round_robin: false,
        pipelines: vec![ResourceRef::pipeline(REDUCE_ALERTS_PIPELINE)],
        proxy_requests: None,
        runtime_assets: vec![asset.to_string()],
        metadata: ObjectMeta {
            annotations: [("attempts".to_string(), "3".to_string())].into(),
            ..ObjectMeta::new(name, namespace)
        },
    })
    .collect()
}
