//! Resolution of metric attributes into the attribute part of a probe command.
//!
//! Each attribute is matched against an ordered rule table; the first rule that
//! produces an expansion wins. Values that depend on the target host are emitted
//! as label templates and filled in by the backend from the proxy entity.

use crate::context::ResolvedContext;
use crate::label::LabelName;
use crate::poem::MetricDefinition;

/// Attributes whose values live in the tenant's secrets file.
pub const SECRETS: &[&str] = &[
    "AGORA_USERNAME",
    "AGORA_PASSWORD",
    "ARGO_API_TOKEN",
    "ARGO_TENANT_TOKEN",
    "B2HANDLE_PASSWORD",
    "EOSC_USERNAME",
    "EOSC_PASSWORD",
    "KEYSTONE_USERNAME",
    "KEYSTONE_PASSWORD",
    "MYSQL_USERNAME",
    "MYSQL_PASSWORD",
    "OIDC_ACCESS_TOKEN",
    "OIDC_CLIENT_ID",
    "OIDC_CLIENT_SECRET",
    "OIDC_REFRESH_TOKEN",
    "argo.api_TOKEN",
    "argo.ams_TOKEN",
    "argo.poem_TOKEN",
];

pub const HOST_CERT: &str = "/etc/sensu/certs/hostcert.pem";
pub const HOST_KEY: &str = "/etc/sensu/certs/hostkey.pem";
pub const KEYSTORE: &str = "/etc/sensu/certs/keystore.jks";
pub const TRUSTSTORE: &str = "/etc/sensu/certs/truststore.ts";

pub fn is_secret(attribute: &str) -> bool {
    SECRETS.contains(&attribute)
}

/// `$SUFFIX`, where `SUFFIX` is the part after the last `.`, upper-cased.
pub fn env_reference(attribute: &str) -> String {
    let suffix = attribute.rsplit('.').next().unwrap_or(attribute);
    format!("${}", suffix.to_uppercase())
}

/// Attributes that are filled from the endpoint URL rather than `info_service_endpoint_URL`.
fn is_info_url(attribute: &str) -> bool {
    attribute == "OS_KEYSTONE_URL" || attribute.ends_with("GOCDB_SERVICE_URL")
}

/// `URL` and `*_URL` attributes filled from `info_service_endpoint_URL`.
pub fn is_endpoint_url(attribute: &str) -> bool {
    (attribute == "URL" || attribute.ends_with("_URL")) && !is_info_url(attribute)
}

/// Attributes whose values are derived from the endpoint's `info_URL`.
pub fn is_url_family(attribute: &str) -> bool {
    matches!(
        attribute,
        "SSL" | "PORT" | "PATH" | "OS_KEYSTONE_HOST" | "OS_KEYSTONE_PORT"
    ) || is_info_url(attribute)
        || is_endpoint_url(attribute)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FlagSide {
    Declared,
    // The label value already carries the flag, or the token has none.
    Empty,
}

#[derive(Debug, PartialEq, Eq)]
struct Expansion {
    flag: FlagSide,
    value: String,
    secret: bool,
}

impl Expansion {
    fn declared(value: impl Into<String>) -> Self {
        Expansion {
            flag: FlagSide::Declared,
            value: value.into(),
            secret: false,
        }
    }

    fn bare(value: impl Into<String>) -> Self {
        Expansion {
            flag: FlagSide::Empty,
            value: value.into(),
            secret: false,
        }
    }

    fn secret(value: impl Into<String>) -> Self {
        Expansion {
            secret: true,
            ..Expansion::declared(value)
        }
    }
}

struct Query<'a> {
    ctx: &'a ResolvedContext,
    metric: &'a MetricDefinition,
    attribute: &'a str,
    flag: &'a str,
}

type Rule = fn(&Query<'_>) -> Option<Expansion>;

/// Evaluated in order. The extension rule is last but one and the fallback always matches.
const RULES: &[(&str, Rule)] = &[
    ("global override", global_override),
    ("secret", secret),
    ("hard-coded path", hardcoded_path),
    ("default port", default_port),
    ("well-known token", well_known_token),
    ("extension", extension),
    ("fallback", fallback),
];

fn global_override(q: &Query<'_>) -> Option<Expansion> {
    q.ctx.global(q.attribute).map(Expansion::declared)
}

fn secret(q: &Query<'_>) -> Option<Expansion> {
    // Host-level overrides carry environment references too, so they need the secrets file.
    if q.ctx.is_host_overridden(q.attribute) {
        return Some(Expansion::secret(LabelName::new(q.attribute).template()));
    }

    is_secret(q.attribute).then(|| Expansion::secret(env_reference(q.attribute)))
}

fn hardcoded_path(q: &Query<'_>) -> Option<Expansion> {
    let value = match q.attribute {
        "NAGIOS_HOST_CERT" => q.ctx.global("ROBOT_CERT").unwrap_or(HOST_CERT),
        "NAGIOS_HOST_KEY" => q.ctx.global("ROBOT_KEY").unwrap_or(HOST_KEY),
        "KEYSTORE" => KEYSTORE,
        "TRUSTSTORE" => TRUSTSTORE,
        "TOP_BDII" => q.ctx.global("BDII_HOST").unwrap_or_default(),
        _ => return None,
    };

    Some(Expansion::declared(value))
}

fn default_port(q: &Query<'_>) -> Option<Expansion> {
    q.ctx.default_port(q.attribute).map(Expansion::declared)
}

fn well_known_token(q: &Query<'_>) -> Option<Expansion> {
    let label = |name: &str| LabelName::new(name).template();

    let expansion = match q.attribute {
        "SSL" => Expansion::bare(label("ssl")),
        "PATH" => Expansion::declared(LabelName::new("path").template_with_default("/")),
        "PORT" => Expansion::declared(label("port")),
        "SITENAME" => Expansion::declared(label("site")),
        "HOSTDN" => Expansion::declared(label("info_hostdn")),
        "OS_KEYSTONE_HOST" => Expansion::declared(label("os_keystone_host")),
        "OS_KEYSTONE_PORT" => Expansion::declared(label("os_keystone_port")),
        attribute if is_info_url(attribute) => Expansion::declared(label("info_url")),
        attribute if is_endpoint_url(attribute) => {
            Expansion::declared(label("info_service_endpoint_url"))
        }
        _ => return None,
    };

    Some(expansion)
}

fn extension(q: &Query<'_>) -> Option<Expansion> {
    if !q.ctx.is_extension(q.attribute) {
        return None;
    }

    if q.ctx.extension_universal_for_metric(&q.metric.name, q.attribute) {
        Some(Expansion::declared(LabelName::new(q.attribute).template()))
    } else {
        Some(Expansion::bare(
            LabelName::flagged(q.flag, q.attribute).template_with_default(""),
        ))
    }
}

fn fallback(q: &Query<'_>) -> Option<Expansion> {
    Some(Expansion::declared(LabelName::new(q.attribute).template()))
}

/// Attribute part of a probe command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedAttributes {
    pub rendered: String,
    /// At least one value references a variable from the secrets file.
    pub uses_secret: bool,
}

pub fn resolve(ctx: &ResolvedContext, metric: &MetricDefinition) -> ResolvedAttributes {
    let mut parts = Vec::new();
    let mut uses_secret = false;

    for (attribute, flag) in &metric.attributes {
        let query = Query {
            ctx,
            metric,
            attribute,
            flag,
        };

        let Some((rule, expansion)) = RULES
            .iter()
            .find_map(|(rule, apply)| apply(&query).map(|expansion| (rule, expansion)))
        else {
            continue;
        };

        let part = match expansion.flag {
            FlagSide::Declared => format!("{flag} {}", expansion.value),
            FlagSide::Empty => expansion.value,
        };
        let part = part.trim();

        if part.is_empty() {
            tracing::debug!(
                "{}: attribute {attribute} of {} resolved to nothing by the {rule} rule, omitted",
                ctx.tenant(),
                metric.name
            );
            continue;
        }

        uses_secret |= expansion.secret;
        parts.push(part.to_string());
    }

    ResolvedAttributes {
        rendered: parts.join(" "),
        uses_secret,
    }
}
