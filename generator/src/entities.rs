//! Projection of topology endpoints into Sensu proxy entities.

use crate::attributes::{env_reference, is_endpoint_url, is_url_family};
use crate::context::{ResolvedContext, SITE_BDII, TOP_BDII};
use crate::label::LabelName;
use crate::records::{Entity, ObjectMeta};
use crate::webapi::Endpoint;
use std::collections::{BTreeMap, HashSet};
use url::Url;

pub const OPENSTACK_SERVICES: &[&str] = &["org.openstack.nova", "org.openstack.swift"];

const SSH_METRIC: &str = "generic.ssh.connect";
const SSH_PORT: &str = "22";

pub fn entity_name(service: &str, hostname: &str) -> String {
    format!("{service}__{hostname}")
}

/// One proxy entity per selected endpoint. Duplicate `service__hostname` pairs keep the first.
pub fn project(ctx: &ResolvedContext, namespace: &str) -> Vec<Entity> {
    let mut seen = HashSet::new();
    let mut entities = Vec::new();

    for endpoint in ctx.endpoints() {
        let name = entity_name(&endpoint.service, &endpoint.hostname);
        if !seen.insert(name.clone()) {
            tracing::debug!("{namespace}: duplicate endpoint {name} in topology, skipping");
            continue;
        }

        entities.push(Entity {
            entity_class: Entity::PROXY.to_string(),
            metadata: ObjectMeta {
                labels: labels(ctx, endpoint),
                ..ObjectMeta::new(name, namespace)
            },
            subscriptions: vec![endpoint.service.clone()],
        });
    }

    entities
}

#[derive(Default)]
struct Labels(BTreeMap<String, String>);

impl Labels {
    fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(key.as_ref().to_string(), value.into());
    }

    fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

fn labels(ctx: &ResolvedContext, endpoint: &Endpoint) -> BTreeMap<String, String> {
    let service = endpoint.service.as_str();
    let mut labels = Labels::default();

    labels.set("hostname", &endpoint.hostname);
    labels.set("service", service);
    labels.set("site", &endpoint.group);

    if ctx.service_uses_attribute(service, is_url_family) {
        url_labels(ctx, endpoint, &mut labels);
    }
    endpoint_url_label(ctx, endpoint, &mut labels);

    match service {
        TOP_BDII => {
            labels.set("bdii_dn", "Mds-Vo-Name=local,O=Grid");
            labels.set("bdii_type", "bdii_top");
            labels.set("glue2_bdii_dn", format!("GLUE2DomainID={},o=glue", endpoint.group));
        }
        SITE_BDII => {
            labels.set("bdii_dn", format!("Mds-Vo-Name={},O=Grid", endpoint.group));
            labels.set("bdii_type", "bdii_site");
            labels.set("glue2_bdii_dn", format!("GLUE2DomainID={},o=glue", endpoint.group));
        }
        _ => {}
    }

    if let Some(hostdn) = endpoint.tag("info_HOSTDN") {
        labels.set("info_hostdn", hostdn);
    }

    metric_labels(ctx, endpoint, &mut labels);
    extension_labels(ctx, endpoint, &mut labels);

    if ctx.metrics_for_service(service).iter().any(|m| m == SSH_METRIC) && !labels.contains("port") {
        labels.set("port", SSH_PORT);
    }

    if let Some(site_bdii) = ctx.site_bdii(&endpoint.group) {
        labels.set("site_bdii", site_bdii);
    }

    labels.0
}

fn url_labels(ctx: &ResolvedContext, endpoint: &Endpoint, labels: &mut Labels) {
    let info_url = endpoint.tag("info_URL");

    if let Some(raw) = info_url {
        labels.set("info_url", raw);

        match Url::parse(raw) {
            Ok(url) => {
                let port = url.port().or(match url.scheme() {
                    "https" => Some(443),
                    "http" => Some(80),
                    _ => url.port_or_known_default(),
                });
                if let Some(port) = port {
                    labels.set("port", port.to_string());
                }

                let path = if url.path().is_empty() { "/" } else { url.path() };
                labels.set("path", path);
                labels.set("ssl", if url.scheme() == "https" { "-S --sni" } else { "" });

                if OPENSTACK_SERVICES.contains(&endpoint.service.as_str()) {
                    if let Some(host) = url.host_str() {
                        labels.set("os_keystone_host", host);
                    }
                    if let Some(port) = port {
                        labels.set("os_keystone_port", port.to_string());
                    }
                }
            }
            Err(e) => tracing::warn!(
                "{}: cannot parse info_URL {raw} of {}: {e}",
                ctx.tenant(),
                endpoint.hostname
            ),
        }
    }
}

/// Only the first of several comma-separated endpoint URLs is used.
fn endpoint_url_label(ctx: &ResolvedContext, endpoint: &Endpoint, labels: &mut Labels) {
    if let Some(value) = endpoint.tag("info_service_endpoint_URL") {
        let first = value.split(',').next().unwrap_or(value).trim();
        labels.set("info_service_endpoint_url", first);
    } else if let Some(raw) = endpoint.tag("info_URL")
        && ctx.service_uses_attribute(&endpoint.service, is_endpoint_url)
    {
        labels.set("info_service_endpoint_url", raw);
    }
}

fn metric_labels(ctx: &ResolvedContext, endpoint: &Endpoint, labels: &mut Labels) {
    for name in ctx.metrics_for_service(&endpoint.service) {
        labels.set(LabelName::new(name), name.as_str());

        for o in ctx.parameter_overrides_for(name, &endpoint.hostname) {
            labels.set(LabelName::parameter(name, &o.parameter), o.value.as_str());
        }

        let Some(metric) = ctx.metric(name) else {
            continue;
        };

        for attribute in metric
            .attributes
            .keys()
            .filter(|attribute| ctx.is_host_overridden(attribute))
        {
            let value = match ctx.host_override(&endpoint.hostname, attribute) {
                Some(value) => format!("${}", value.trim().trim_start_matches('$')),
                None => env_reference(attribute),
            };
            labels.set(LabelName::new(attribute), value);
        }
    }
}

fn extension_labels(ctx: &ResolvedContext, endpoint: &Endpoint, labels: &mut Labels) {
    let service = endpoint.service.as_str();

    for (extension, value) in endpoint.extensions() {
        if extension == "PORT" {
            labels.set("port", value);
            continue;
        }

        if ctx.extension_on_every_endpoint(service, extension) {
            labels.set(LabelName::new(extension), value);
        }

        for name in ctx.metrics_for_service(service) {
            let Some(flag) = ctx
                .metric(name)
                .and_then(|metric| metric.attributes.get(extension))
            else {
                continue;
            };

            if !ctx.extension_universal_for_metric(name, extension) {
                labels.set(
                    LabelName::flagged(flag, extension),
                    format!("{flag} {value}").trim(),
                );
            }
        }
    }
}
