use crate::attributes;
use crate::context::ResolvedContext;
use crate::label::LabelName;
use crate::poem::MetricDefinition;

/// Shell prefix exporting every variable of the secrets file to the probe.
pub fn secrets_prefix(secrets: &str) -> String {
    format!("source {secrets}; export $(cut -d= -f1 {secrets}); ")
}

/// Builds the command line of `metric`, with host-specific values left as label templates.
pub fn synthesize(ctx: &ResolvedContext, metric: &MetricDefinition) -> String {
    let resolved = attributes::resolve(ctx, metric);

    let mut parts = vec![metric.executable()];

    if !metric.flags.nohostname {
        parts.push(format!("-H {}", LabelName::new("hostname").template()));
    }

    if !metric.flags.notimeout {
        parts.push(format!("-t {}", metric.config.timeout));
    }

    for (flag, value) in &metric.parameters {
        let value = if ctx.is_parameter_overridden(&metric.name, flag) {
            LabelName::parameter(&metric.name, flag).template_with_default(value)
        } else {
            value.clone()
        };
        parts.push(format!("{flag} {value}").trim().to_string());
    }

    if !resolved.rendered.is_empty() {
        parts.push(resolved.rendered);
    }

    let command = parts.join(" ");

    match ctx.secrets() {
        Some(secrets) if resolved.uses_secret => format!("{}{command}", secrets_prefix(secrets)),
        _ => command,
    }
}
