//! Metrics definitions for the controller.

use shared::metrics_defs::{MetricDef, MetricType};

pub const NAMESPACE_SKIPPED: MetricDef = MetricDef {
    name: "reconcile.namespace.skipped",
    metric_type: MetricType::Counter,
    description: "Number of namespaces skipped because of an error",
};

pub const PASS_DURATION: MetricDef = MetricDef {
    name: "reconcile.pass.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a reload pass in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[NAMESPACE_SKIPPED, PASS_DURATION];
