//! Metrics definitions for the reconciler.

use shared::metrics_defs::{MetricDef, MetricType};

pub const OBJECTS_CREATED: MetricDef = MetricDef {
    name: "reconcile.objects.created",
    metric_type: MetricType::Counter,
    description: "Number of backend objects created, by kind",
};

pub const OBJECTS_UPDATED: MetricDef = MetricDef {
    name: "reconcile.objects.updated",
    metric_type: MetricType::Counter,
    description: "Number of backend objects updated, by kind",
};

pub const OBJECTS_DELETED: MetricDef = MetricDef {
    name: "reconcile.objects.deleted",
    metric_type: MetricType::Counter,
    description: "Number of backend objects deleted, by kind",
};

pub const OBJECTS_FAILED: MetricDef = MetricDef {
    name: "reconcile.objects.failed",
    metric_type: MetricType::Counter,
    description: "Number of object operations the backend rejected, by kind",
};

pub const EVENTS_DELETED: MetricDef = MetricDef {
    name: "reconcile.events.deleted",
    metric_type: MetricType::Counter,
    description: "Number of events removed because their check no longer exists",
};

pub const ALL_METRICS: &[MetricDef] = &[
    OBJECTS_CREATED,
    OBJECTS_UPDATED,
    OBJECTS_DELETED,
    OBJECTS_FAILED,
    EVENTS_DELETED,
];
