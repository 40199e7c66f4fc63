//! Entry point of the generator: one tenant's inputs in, its desired objects out.

use crate::checks;
use crate::context::{ResolvedContext, SubscriptionMode, TenantInputs};
use crate::entities;
use crate::errors::GeneratorError;
use crate::internals::InternalServices;
use crate::poem::{HostAttribute, MetricParameterOverride};
use crate::records::{Check, Entity};
use std::collections::BTreeMap;

/// Desired state contributed by a single tenant.
#[derive(Clone, Debug, PartialEq)]
pub struct TenantPlan {
    pub tenant: String,
    pub namespace: String,
    pub checks: Vec<Check>,
    pub entities: Vec<Entity>,
    pub internal: InternalServices,
    /// Subscriptions every live agent of the namespace must carry.
    pub agent_subscriptions: Vec<String>,
    /// Additional subscriptions for named agents.
    pub agent_extras: BTreeMap<String, Vec<String>>,
    pub parameter_overrides: Vec<MetricParameterOverride>,
    pub host_attribute_overrides: Vec<HostAttribute>,
    pub secrets: Option<String>,
    pub publish: bool,
}

/// Desired state of a namespace after all its tenants are merged.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NamespacePlan {
    pub namespace: String,
    pub tenants: Vec<String>,
    pub checks: Vec<Check>,
    pub entities: Vec<Entity>,
    pub internal: InternalServices,
    pub agent_subscriptions: Vec<String>,
    pub agent_extras: BTreeMap<String, Vec<String>>,
    /// Already folded into the check commands and entity labels; kept for reporting.
    pub parameter_overrides: Vec<MetricParameterOverride>,
    /// Already folded into the entity labels; kept for reporting.
    pub host_attribute_overrides: Vec<HostAttribute>,
    /// Secrets file sourced by the internal handlers, the first tenant's.
    pub secrets: Option<String>,
    /// Whether any tenant publishes results.
    pub publish: bool,
}

impl From<TenantPlan> for NamespacePlan {
    fn from(plan: TenantPlan) -> Self {
        NamespacePlan {
            namespace: plan.namespace,
            tenants: vec![plan.tenant],
            checks: plan.checks,
            entities: plan.entities,
            internal: plan.internal,
            agent_subscriptions: plan.agent_subscriptions,
            agent_extras: plan.agent_extras,
            parameter_overrides: plan.parameter_overrides,
            host_attribute_overrides: plan.host_attribute_overrides,
            secrets: plan.secrets,
            publish: plan.publish,
        }
    }
}

pub struct Generator {
    ctx: ResolvedContext,
}

impl Generator {
    pub fn new(inputs: &TenantInputs) -> Result<Self, GeneratorError> {
        Ok(Generator {
            ctx: ResolvedContext::build(inputs)?,
        })
    }

    pub fn generate(&self, namespace: &str) -> TenantPlan {
        let ctx = &self.ctx;
        let options = ctx.options();

        let checks = checks::build(ctx, namespace);
        let entities = entities::project(ctx, namespace);
        tracing::debug!(
            "{namespace}: Tenant {} produced {} checks and {} entities",
            ctx.tenant(),
            checks.len(),
            entities.len()
        );

        TenantPlan {
            tenant: ctx.tenant().to_string(),
            namespace: namespace.to_string(),
            internal: InternalServices::build(
                namespace,
                options.publish,
                options.publisher_queue.as_deref(),
                ctx.secrets(),
            ),
            agent_subscriptions: self.agent_subscriptions(&checks),
            agent_extras: options.agents.clone(),
            checks,
            entities,
            parameter_overrides: ctx.parameter_overrides().to_vec(),
            host_attribute_overrides: ctx.host_attribute_overrides().to_vec(),
            secrets: ctx.secrets().map(str::to_string),
            publish: options.publish,
        }
    }

    fn agent_subscriptions(&self, checks: &[Check]) -> Vec<String> {
        let mut subscriptions: Vec<String> = Vec::new();
        let mut add = |value: &str| {
            if !subscriptions.iter().any(|existing| existing == value) {
                subscriptions.push(value.to_string());
            }
        };

        for endpoint in self.ctx.endpoints() {
            match self.ctx.options().subscription {
                SubscriptionMode::Servicetype | SubscriptionMode::Entity => add(&endpoint.service),
                SubscriptionMode::Hostname => add(&endpoint.hostname),
                SubscriptionMode::HostnameWithId => match endpoint.tag("info_ID") {
                    Some(id) => add(&format!("{}_{id}", endpoint.hostname)),
                    None => add(&endpoint.hostname),
                },
            }
        }

        for subscription in checks.iter().flat_map(|check| &check.subscriptions) {
            add(subscription);
        }

        subscriptions
    }
}
