//! Immutable view over one tenant's upstream data, computed once per pass.
//!
//! Everything the projections need to look up (profile selection, overrides,
//! extension coverage, site-BDII hosts) is indexed here up front, so attribute
//! resolution, command synthesis and entity projection stay plain functions of
//! `&ResolvedContext`.

use crate::errors::GeneratorError;
use crate::poem::{
    DefaultPort, HostAttribute, MetricDefinition, MetricOverrides, MetricParameterOverride,
    RawMetrics, metric_definitions,
};
use crate::webapi::{Endpoint, MetricProfile};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

pub const SITE_BDII: &str = "Site-BDII";
pub const TOP_BDII: &str = "Top-BDII";

/// How agents are subscribed to the proxy checks of a tenant.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    Hostname,
    HostnameWithId,
    #[default]
    Servicetype,
    Entity,
}

/// Runtime options of a tenant that influence generation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TenantOptions {
    pub metric_profiles: Vec<String>,
    pub publish: bool,
    pub publisher_queue: Option<String>,
    pub secrets: Option<String>,
    pub subscription: SubscriptionMode,
    /// Extra subscriptions per agent name.
    pub agents: BTreeMap<String, Vec<String>>,
    pub skipped_metrics: Vec<String>,
}

/// Everything fetched for one tenant.
#[derive(Clone, Debug, Default)]
pub struct TenantInputs {
    pub tenant: String,
    pub metrics: RawMetrics,
    pub overrides: MetricOverrides,
    pub default_ports: Vec<DefaultPort>,
    pub profiles: Vec<MetricProfile>,
    pub topology: Vec<Endpoint>,
    pub options: TenantOptions,
}

#[derive(Clone, Debug)]
pub struct ResolvedContext {
    tenant: String,
    options: TenantOptions,
    metrics: IndexMap<String, MetricDefinition>,
    service_metrics: IndexMap<String, Vec<String>>,
    metric_services: IndexMap<String, Vec<String>>,
    endpoints: Vec<Endpoint>,
    globals: HashMap<String, String>,
    default_ports: HashMap<String, String>,
    host_attributes: Vec<HostAttribute>,
    host_overridden: HashSet<String>,
    parameter_overrides: Vec<MetricParameterOverride>,
    extensions: HashSet<String>,
    // service -> extension -> number of endpoints carrying it
    extension_counts: HashMap<String, HashMap<String, usize>>,
    endpoint_counts: HashMap<String, usize>,
    site_bdii: HashMap<String, String>,
}

impl ResolvedContext {
    pub fn build(inputs: &TenantInputs) -> Result<Self, GeneratorError> {
        let metrics: IndexMap<String, MetricDefinition> = metric_definitions(&inputs.metrics)?
            .into_iter()
            .map(|metric| (metric.name.clone(), metric))
            .collect();

        let topology_services: HashSet<&str> = inputs
            .topology
            .iter()
            .map(|endpoint| endpoint.service.as_str())
            .collect();

        let mut service_metrics: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut unknown: IndexSet<&str> = IndexSet::new();

        for profile_name in &inputs.options.metric_profiles {
            let profile = inputs
                .profiles
                .iter()
                .find(|profile| &profile.name == profile_name)
                .ok_or_else(|| GeneratorError::MissingProfile(profile_name.clone()))?;

            for selection in &profile.services {
                if !topology_services.contains(selection.service.as_str()) {
                    continue;
                }

                for metric in &selection.metrics {
                    if inputs.options.skipped_metrics.contains(metric) {
                        continue;
                    }
                    if !metrics.contains_key(metric) {
                        unknown.insert(metric.as_str());
                        continue;
                    }

                    let selected = service_metrics.entry(selection.service.clone()).or_default();
                    if !selected.contains(metric) {
                        selected.push(metric.clone());
                    }
                }
            }
        }

        for metric in unknown {
            tracing::warn!(
                "{}: Metric {metric} is in a selected profile but has no runnable definition",
                inputs.tenant
            );
        }

        let mut metric_services: IndexMap<String, Vec<String>> = IndexMap::new();
        for (service, names) in &service_metrics {
            for name in names {
                let services = metric_services.entry(name.clone()).or_default();
                if !services.contains(service) {
                    services.push(service.clone());
                }
            }
        }

        let endpoints: Vec<Endpoint> = inputs
            .topology
            .iter()
            .filter(|endpoint| service_metrics.contains_key(&endpoint.service))
            .cloned()
            .collect();

        let mut extensions = HashSet::new();
        let mut extension_counts: HashMap<String, HashMap<String, usize>> = HashMap::new();
        let mut endpoint_counts: HashMap<String, usize> = HashMap::new();
        for endpoint in &endpoints {
            *endpoint_counts.entry(endpoint.service.clone()).or_default() += 1;

            let seen: HashSet<&str> = endpoint.extensions().map(|(name, _)| name).collect();
            for name in seen {
                extensions.insert(name.to_string());
                *extension_counts
                    .entry(endpoint.service.clone())
                    .or_default()
                    .entry(name.to_string())
                    .or_default() += 1;
            }
        }

        let mut site_bdii = HashMap::new();
        for endpoint in inputs.topology.iter().filter(|e| e.service == SITE_BDII) {
            site_bdii
                .entry(endpoint.group.clone())
                .or_insert_with(|| endpoint.hostname.clone());
        }

        let host_overridden = inputs
            .overrides
            .host_attributes
            .iter()
            .map(|o| o.attribute.clone())
            .collect();

        Ok(ResolvedContext {
            tenant: inputs.tenant.clone(),
            options: inputs.options.clone(),
            metrics,
            service_metrics,
            metric_services,
            endpoints,
            globals: inputs
                .overrides
                .global_attributes
                .iter()
                .map(|g| (g.attribute.clone(), g.value.clone()))
                .collect(),
            default_ports: inputs
                .default_ports
                .iter()
                .map(|p| (p.name.clone(), p.value.clone()))
                .collect(),
            host_attributes: inputs.overrides.host_attributes.clone(),
            host_overridden,
            parameter_overrides: inputs.overrides.metric_parameters.clone(),
            extensions,
            extension_counts,
            endpoint_counts,
            site_bdii,
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn options(&self) -> &TenantOptions {
        &self.options
    }

    pub fn secrets(&self) -> Option<&str> {
        self.options
            .secrets
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    pub fn metric(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.get(name)
    }

    /// Metrics selected for at least one service present in the topology, in profile order.
    pub fn applicable_metrics(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metric_services
            .keys()
            .filter_map(|name| self.metrics.get(name))
    }

    pub fn services(&self) -> impl Iterator<Item = &str> {
        self.service_metrics.keys().map(String::as_str)
    }

    pub fn metrics_for_service(&self, service: &str) -> &[String] {
        self.service_metrics
            .get(service)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn services_for_metric(&self, metric: &str) -> &[String] {
        self.metric_services
            .get(metric)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Whether any metric on `service` declares an attribute matching `predicate`.
    pub fn service_uses_attribute(&self, service: &str, predicate: impl Fn(&str) -> bool) -> bool {
        self.metrics_for_service(service)
            .iter()
            .filter_map(|name| self.metrics.get(name))
            .any(|metric| metric.attributes.keys().any(|attr| predicate(attr.as_str())))
    }

    /// Endpoints whose service is selected by the profiles.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn global(&self, attribute: &str) -> Option<&str> {
        self.globals.get(attribute).map(String::as_str)
    }

    pub fn default_port(&self, attribute: &str) -> Option<&str> {
        self.default_ports.get(attribute).map(String::as_str)
    }

    pub fn host_attribute_overrides(&self) -> &[HostAttribute] {
        &self.host_attributes
    }

    /// Whether `attribute` is overridden for at least one host.
    pub fn is_host_overridden(&self, attribute: &str) -> bool {
        self.host_overridden.contains(attribute)
    }

    pub fn host_override(&self, hostname: &str, attribute: &str) -> Option<&str> {
        self.host_attributes
            .iter()
            .find(|o| o.hostname == hostname && o.attribute == attribute)
            .map(|o| o.value.as_str())
    }

    pub fn parameter_overrides(&self) -> &[MetricParameterOverride] {
        &self.parameter_overrides
    }

    pub fn is_parameter_overridden(&self, metric: &str, parameter: &str) -> bool {
        self.parameter_overrides
            .iter()
            .any(|o| o.metric == metric && o.parameter == parameter)
    }

    pub fn parameter_overrides_for<'a>(
        &'a self,
        metric: &'a str,
        hostname: &'a str,
    ) -> impl Iterator<Item = &'a MetricParameterOverride> {
        self.parameter_overrides
            .iter()
            .filter(move |o| o.metric == metric && o.hostname == hostname)
    }

    /// Whether `name` appears as an `info_ext_<name>` tag on any selected endpoint.
    pub fn is_extension(&self, name: &str) -> bool {
        self.extensions.contains(name)
    }

    pub fn extension_on_every_endpoint(&self, service: &str, extension: &str) -> bool {
        let total = self.endpoint_counts.get(service).copied().unwrap_or_default();
        let carrying = self
            .extension_counts
            .get(service)
            .and_then(|counts| counts.get(extension))
            .copied()
            .unwrap_or_default();

        total > 0 && carrying == total
    }

    /// Whether every endpoint of every service running `metric` carries `extension`.
    pub fn extension_universal_for_metric(&self, metric: &str, extension: &str) -> bool {
        let services = self.services_for_metric(metric);
        !services.is_empty()
            && services
                .iter()
                .all(|service| self.extension_on_every_endpoint(service, extension))
    }

    pub fn site_bdii(&self, group: &str) -> Option<&str> {
        self.site_bdii.get(group).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{endpoint, inputs, metric, profile};

    #[test]
    fn test_profile_selection() {
        let mut inputs = inputs(
            vec![
                metric("generic.tcp.connect", &[]),
                metric("generic.http.connect", &[]),
                metric("generic.ssh.connect", &[]),
            ],
            vec![
                profile(
                    "ARGO_MON",
                    &[
                        ("argo.webui", &["generic.tcp.connect", "generic.http.connect"]),
                        ("eu.argo.ams", &["generic.tcp.connect", "generic.ssh.connect"]),
                        ("not.in.topology", &["generic.tcp.connect"]),
                    ],
                ),
                profile("ARGO_OTHER", &[("argo.webui", &["generic.ssh.connect"])]),
            ],
            vec![
                endpoint("GRNET", "argo.webui", "argo.ni4os.eu", &[]),
                endpoint("GRNET", "eu.argo.ams", "msg.argo.grnet.gr", &[]),
                endpoint("GRNET", "unselected", "other.grnet.gr", &[]),
            ],
        );
        inputs.options.skipped_metrics = vec!["generic.ssh.connect".into()];

        let ctx = ResolvedContext::build(&inputs).unwrap();

        assert_eq!(
            ctx.metrics_for_service("argo.webui"),
            ["generic.tcp.connect", "generic.http.connect"]
        );
        assert_eq!(ctx.metrics_for_service("eu.argo.ams"), ["generic.tcp.connect"]);
        assert_eq!(
            ctx.services_for_metric("generic.tcp.connect"),
            ["argo.webui", "eu.argo.ams"]
        );
        assert!(ctx.services_for_metric("generic.ssh.connect").is_empty());
        assert_eq!(ctx.endpoints().len(), 2);
        assert_eq!(
            ctx.applicable_metrics().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            vec!["generic.tcp.connect", "generic.http.connect"]
        );
    }

    #[test]
    fn test_missing_profile() {
        let mut inputs = inputs(vec![], vec![], vec![]);
        inputs.options.metric_profiles = vec!["NOPE".into()];

        assert_eq!(
            ResolvedContext::build(&inputs).unwrap_err(),
            GeneratorError::MissingProfile("NOPE".into())
        );
    }

    #[test]
    fn test_extension_coverage() {
        let inputs = inputs(
            vec![metric("argo.api.check", &[("ARGO_PATH", "--path")])],
            vec![profile(
                "ARGO_MON",
                &[("argo.api", &["argo.api.check"]), ("argo.webui", &["argo.api.check"])],
            )],
            vec![
                endpoint("GRNET", "argo.api", "api1.argo.grnet.gr", &[("info_ext_ARGO_PATH", "/a")]),
                endpoint("GRNET", "argo.api", "api2.argo.grnet.gr", &[("info_ext_ARGO_PATH", "/b")]),
                endpoint("GRNET", "argo.webui", "ui1.argo.grnet.gr", &[("info_ext_ARGO_PATH", "/c")]),
                endpoint("GRNET", "argo.webui", "ui2.argo.grnet.gr", &[]),
            ],
        );

        let ctx = ResolvedContext::build(&inputs).unwrap();

        assert!(ctx.is_extension("ARGO_PATH"));
        assert!(!ctx.is_extension("PORT"));
        assert!(ctx.extension_on_every_endpoint("argo.api", "ARGO_PATH"));
        assert!(!ctx.extension_on_every_endpoint("argo.webui", "ARGO_PATH"));
        assert!(!ctx.extension_universal_for_metric("argo.api.check", "ARGO_PATH"));
    }

    #[test]
    fn test_site_bdii_lookup() {
        let inputs = inputs(
            vec![metric("generic.tcp.connect", &[])],
            vec![profile("ARGO_MON", &[("argo.webui", &["generic.tcp.connect"])])],
            vec![
                endpoint("SITE-A", "Site-BDII", "bdii.site-a.eu", &[]),
                endpoint("SITE-A", "argo.webui", "ui.site-a.eu", &[]),
                endpoint("SITE-B", "argo.webui", "ui.site-b.eu", &[]),
            ],
        );

        let ctx = ResolvedContext::build(&inputs).unwrap();

        assert_eq!(ctx.site_bdii("SITE-A"), Some("bdii.site-a.eu"));
        assert_eq!(ctx.site_bdii("SITE-B"), None);
    }
}
