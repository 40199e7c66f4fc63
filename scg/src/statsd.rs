use crate::config::MetricsConfig;
use metrics_exporter_statsd::StatsdBuilder;
use shared::metrics_defs::MetricType;

#[derive(thiserror::Error, Debug)]
pub enum MetricsInitError {
    #[error("could not build statsd recorder: {0}")]
    Statsd(#[from] metrics_exporter_statsd::StatsdError),
    #[error("a metrics recorder is already installed")]
    AlreadyInstalled,
}

/// Sends every metric to statsd, prefixed with `scg`.
pub fn init(config: &MetricsConfig) -> Result<(), MetricsInitError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port).build(Some("scg"))?;

    metrics::set_global_recorder(recorder).map_err(|_| MetricsInitError::AlreadyInstalled)?;

    for def in crate::metrics_defs::ALL_METRICS
        .iter()
        .chain(sensu::metrics_defs::ALL_METRICS)
    {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Gauge => metrics::describe_gauge!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }

    Ok(())
}
