use crate::context::TenantInputs;
use crate::poem::{RawMetric, RawMetrics};
use crate::webapi::{Endpoint, MetricProfile, ProfileService};
use indexmap::IndexMap;
use std::collections::HashMap;

pub fn metric(name: &str, attributes: &[(&str, &str)]) -> (String, RawMetric) {
    let raw = RawMetric {
        probe: format!("check_{}", name.rsplit('.').next().unwrap_or(name)),
        config: HashMap::from([
            ("interval".to_string(), "5".to_string()),
            ("timeout".to_string(), "60".to_string()),
            ("maxCheckAttempts".to_string(), "3".to_string()),
            ("path".to_string(), "/usr/lib64/nagios/plugins".to_string()),
        ]),
        attribute: attributes
            .iter()
            .map(|(attr, flag)| (attr.to_string(), flag.to_string()))
            .collect(),
        ..Default::default()
    };

    (name.to_string(), raw)
}

pub fn profile(name: &str, services: &[(&str, &[&str])]) -> MetricProfile {
    MetricProfile {
        name: name.to_string(),
        services: services
            .iter()
            .map(|(service, metrics)| ProfileService {
                service: service.to_string(),
                metrics: metrics.iter().map(|m| m.to_string()).collect(),
            })
            .collect(),
    }
}

pub fn endpoint(group: &str, service: &str, hostname: &str, tags: &[(&str, &str)]) -> Endpoint {
    Endpoint {
        group: group.to_string(),
        service: service.to_string(),
        hostname: hostname.to_string(),
        tags: tags
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    }
}

/// Tenant `TENANT1` selecting every given profile.
pub fn inputs(
    metrics: Vec<(String, RawMetric)>,
    profiles: Vec<MetricProfile>,
    topology: Vec<Endpoint>,
) -> TenantInputs {
    let raw: RawMetrics = metrics
        .into_iter()
        .map(|(name, metric)| IndexMap::from([(name, metric)]))
        .collect();

    let mut inputs = TenantInputs {
        tenant: "TENANT1".to_string(),
        metrics: raw,
        profiles,
        topology,
        ..Default::default()
    };
    inputs.options.metric_profiles = inputs.profiles.iter().map(|p| p.name.clone()).collect();
    inputs
}

/// Mutable access to a metric added through [`inputs`].
pub fn raw_metric<'a>(inputs: &'a mut TenantInputs, name: &str) -> &'a mut RawMetric {
    inputs
        .metrics
        .iter_mut()
        .find_map(|entry| entry.get_mut(name))
        .expect("metric in inputs")
}
