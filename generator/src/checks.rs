use crate::command;
use crate::context::ResolvedContext;
use crate::label::LabelName;
use crate::records::{Check, ObjectMeta, ProxyRequests, ResourceRef};
use std::collections::BTreeMap;

pub const DEFAULT_NAMESPACE: &str = "default";
pub const CHECK_TIMEOUT: u64 = 900;
pub const PUBLISHER_HANDLER: &str = "publisher-handler";
pub const REDUCE_ALERTS_PIPELINE: &str = "reduce_alerts";

/// One check per metric selected for a service present in the topology.
pub fn build(ctx: &ResolvedContext, namespace: &str) -> Vec<Check> {
    let publish = ctx.options().publish;

    ctx.applicable_metrics()
        .map(|metric| {
            let (handlers, pipelines) = if publish && !metric.flags.nopublish {
                (vec![PUBLISHER_HANDLER.to_string()], vec![])
            } else if !publish {
                (vec![], vec![ResourceRef::pipeline(REDUCE_ALERTS_PIPELINE)])
            } else {
                (vec![], vec![])
            };

            let proxy_requests = (namespace != DEFAULT_NAMESPACE).then(|| ProxyRequests {
                entity_attributes: vec![
                    "entity.entity_class == 'proxy'".to_string(),
                    format!(
                        "entity.labels.{} == '{}'",
                        LabelName::new(&metric.name),
                        metric.name
                    ),
                ],
            });

            Check {
                command: command::synthesize(ctx, metric),
                subscriptions: ctx.services_for_metric(&metric.name).to_vec(),
                handlers,
                interval: metric.config.interval.saturating_mul(60),
                timeout: CHECK_TIMEOUT,
                publish: true,
                round_robin: false,
                pipelines,
                proxy_requests,
                runtime_assets: vec![],
                metadata: ObjectMeta {
                    annotations: BTreeMap::from([(
                        "attempts".to_string(),
                        metric.config.max_check_attempts.to_string(),
                    )]),
                    ..ObjectMeta::new(&metric.name, namespace)
                },
            }
        })
        .collect()
}
