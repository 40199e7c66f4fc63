//! Response schemas of the metric configuration source (POEM) and their typed form.

use crate::errors::GeneratorError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One metric as returned by `/api/v2/metrics`, before validation.
///
/// The upstream keeps every value as a string, including numbers in `config`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RawMetric {
    #[serde(default)]
    pub probe: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
    #[serde(default)]
    pub flags: HashMap<String, String>,
    #[serde(default)]
    pub parameter: IndexMap<String, String>,
    #[serde(default)]
    pub attribute: IndexMap<String, String>,
}

/// The metrics endpoint returns a list of single-entry maps, `[{name: metric}, ...]`.
pub type RawMetrics = Vec<IndexMap<String, RawMetric>>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricFlags {
    pub nohostname: bool,
    pub notimeout: bool,
    pub nopublish: bool,
}

impl MetricFlags {
    fn from_raw(flags: &HashMap<String, String>) -> Self {
        let is_set = |name: &str| flags.get(name).is_some_and(|value| value.trim() != "0");

        MetricFlags {
            nohostname: is_set("NOHOSTNAME"),
            notimeout: is_set("NOTIMEOUT"),
            nopublish: is_set("NOPUBLISH"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetricConfig {
    /// Minutes between executions.
    pub interval: u64,
    /// Seconds passed to the probe with `-t`.
    pub timeout: u64,
    pub max_check_attempts: u32,
    pub path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MetricDefinition {
    pub name: String,
    pub probe: String,
    pub config: MetricConfig,
    pub flags: MetricFlags,
    /// Parameter flag to value, in declaration order.
    pub parameters: IndexMap<String, String>,
    /// Attribute name to flag, in declaration order.
    pub attributes: IndexMap<String, String>,
}

impl MetricDefinition {
    /// Validates a raw metric. Metrics without a `path` are not runnable and yield `Ok(None)`.
    pub fn from_raw(name: &str, raw: &RawMetric) -> Result<Option<Self>, GeneratorError> {
        let Some(path) = raw.config.get("path") else {
            return Ok(None);
        };

        let config = MetricConfig {
            interval: numeric(name, raw, "interval")?,
            timeout: numeric(name, raw, "timeout")?,
            max_check_attempts: numeric(name, raw, "maxCheckAttempts")?,
            path: path.clone(),
        };

        if config.interval.checked_mul(60).is_none() {
            return Err(GeneratorError::MalformedMetric {
                metric: name.to_string(),
                reason: format!("interval out of range: {}", config.interval),
            });
        }

        if raw.probe.trim().is_empty() {
            return Err(GeneratorError::MalformedMetric {
                metric: name.to_string(),
                reason: "empty probe".into(),
            });
        }

        Ok(Some(MetricDefinition {
            name: name.to_string(),
            probe: raw.probe.trim().to_string(),
            config,
            flags: MetricFlags::from_raw(&raw.flags),
            parameters: raw.parameter.clone(),
            attributes: raw.attribute.clone(),
        }))
    }

    /// Path of the probe executable.
    pub fn executable(&self) -> String {
        format!("{}/{}", self.config.path.trim_end_matches('/'), self.probe)
    }
}

fn numeric<T: std::str::FromStr>(name: &str, raw: &RawMetric, key: &str) -> Result<T, GeneratorError> {
    let value = raw
        .config
        .get(key)
        .ok_or_else(|| GeneratorError::MalformedMetric {
            metric: name.to_string(),
            reason: format!("missing config key {key}"),
        })?;

    value
        .trim()
        .parse()
        .map_err(|_| GeneratorError::MalformedMetric {
            metric: name.to_string(),
            reason: format!("config key {key} is not a number: {value}"),
        })
}

/// Validates every metric in an upstream response, dropping the ones without a `path`.
pub fn metric_definitions(raw: &RawMetrics) -> Result<Vec<MetricDefinition>, GeneratorError> {
    let mut definitions = Vec::new();

    for (name, metric) in raw.iter().flat_map(|entry| entry.iter()) {
        match MetricDefinition::from_raw(name, metric)? {
            Some(definition) => definitions.push(definition),
            None => tracing::warn!("Metric {name} has no path configured, skipping"),
        }
    }

    Ok(definitions)
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct GlobalAttribute {
    pub attribute: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct HostAttribute {
    pub hostname: String,
    pub attribute: String,
    pub value: String,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetricParameterOverride {
    pub hostname: String,
    pub metric: String,
    pub parameter: String,
    pub value: String,
}

/// Response of `/api/v2/metricoverrides`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct MetricOverrides {
    #[serde(default)]
    pub global_attributes: Vec<GlobalAttribute>,
    #[serde(default)]
    pub host_attributes: Vec<HostAttribute>,
    #[serde(default)]
    pub metric_parameters: Vec<MetricParameterOverride>,
}

/// Entry of `/api/v2/default_ports`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DefaultPort {
    pub name: String,
    pub value: String,
}
