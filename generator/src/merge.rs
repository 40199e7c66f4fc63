//! Combining the plans of tenants that share a namespace.

use crate::plan::{NamespacePlan, TenantPlan};

/// Merges tenant plans in the given order.
///
/// Checks and entities are identified by name. A colliding check keeps the first
/// definition, a colliding entity keeps its first labels and gains the labels it
/// did not have yet. Everything else is a union.
pub fn merge(namespace: &str, plans: Vec<TenantPlan>) -> NamespacePlan {
    let mut merged = NamespacePlan {
        namespace: namespace.to_string(),
        ..Default::default()
    };

    for (index, plan) in plans.into_iter().enumerate() {
        if index == 0 {
            merged = NamespacePlan::from(plan);
            merged.namespace = namespace.to_string();
            continue;
        }

        // The internal handlers already source the first tenant's secrets.
        if plan.secrets != merged.secrets {
            tracing::warn!(
                "{namespace}: Tenant {} uses secrets {:?} while {} uses {:?}, keeping the latter",
                plan.tenant,
                plan.secrets,
                merged.tenants.join(", "),
                merged.secrets
            );
        }

        for check in plan.checks {
            if !merged
                .checks
                .iter()
                .any(|existing| existing.metadata.name == check.metadata.name)
            {
                merged.checks.push(check);
            }
        }

        for entity in plan.entities {
            match merged
                .entities
                .iter_mut()
                .find(|existing| existing.metadata.name == entity.metadata.name)
            {
                Some(existing) => {
                    for (key, value) in entity.metadata.labels {
                        existing.metadata.labels.entry(key).or_insert(value);
                    }
                    for subscription in entity.subscriptions {
                        if !existing.subscriptions.contains(&subscription) {
                            existing.subscriptions.push(subscription);
                        }
                    }
                }
                None => merged.entities.push(entity),
            }
        }

        merged.internal.extend(plan.internal);
        merged.publish |= plan.publish;

        union(&mut merged.agent_subscriptions, plan.agent_subscriptions);
        for (agent, extras) in plan.agent_extras {
            union(merged.agent_extras.entry(agent).or_default(), extras);
        }
        union(&mut merged.parameter_overrides, plan.parameter_overrides);
        union(&mut merged.host_attribute_overrides, plan.host_attribute_overrides);

        merged.tenants.push(plan.tenant);
    }

    merged
}

fn union<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}
