//! Common types for metrics definitions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Gauge => "Gauge",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Increments or records against a `MetricDef`, forwarding any label pairs.
///
/// ```ignore
/// counter!(OBJECTS_CREATED, "kind" => "checks").increment(1);
/// ```
#[macro_export]
macro_rules! counter {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::metrics::counter!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! gauge {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::metrics::gauge!($def.name $(, $key => $value)*)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr $(, $key:expr => $value:expr)* $(,)?) => {
        $crate::metrics::histogram!($def.name $(, $key => $value)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COUNTER: MetricDef = MetricDef {
        name: "test.counter",
        metric_type: MetricType::Counter,
        description: "Counter used by the macro tests",
    };

    #[test]
    fn test_macros_without_recorder() {
        // No recorder installed: the calls are no-ops.
        crate::counter!(TEST_COUNTER).increment(1);
        crate::counter!(TEST_COUNTER, "kind" => "checks").increment(2);
        crate::histogram!(TEST_COUNTER).record(1.5);
        crate::gauge!(TEST_COUNTER).set(3.0);
    }

    #[test]
    fn test_metric_type_names() {
        assert_eq!(MetricType::Counter.as_str(), "Counter");
        assert_eq!(MetricType::Histogram.as_str(), "Histogram");
        assert_eq!(TEST_COUNTER.metric_type.as_str(), "Counter");
    }
}
