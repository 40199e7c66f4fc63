use generator::{SubscriptionMode, TenantOptions};
use indexmap::IndexMap;
use ini::{Ini, ParseOption, Properties};
use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_CONFIG: &str = "/etc/argo-scg/scg.yaml";

#[derive(Deserialize, Debug, Default)]
pub struct GeneralConfig {
    #[serde(default)]
    pub sensu_url: String,
    #[serde(default)]
    pub sensu_token: String,
    #[serde(default)]
    pub webapi_url: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub sentry_dsn: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Deserialize, Debug, Default)]
pub struct TenantConfig {
    #[serde(default)]
    pub poem_url: String,
    #[serde(default)]
    pub poem_token: String,
    #[serde(default)]
    pub webapi_token: String,
    #[serde(default, deserialize_with = "comma_list")]
    pub metricprofiles: Vec<String>,
    #[serde(default)]
    pub publish: bool,
    pub publisher_queue: Option<String>,
    pub topology_groups_filter: Option<String>,
    pub topology_endpoints_filter: Option<String>,
    pub topology: Option<PathBuf>,
    pub secrets: Option<String>,
    pub agents_configuration: Option<PathBuf>,
    pub subscription: Option<String>,
    pub namespace: Option<String>,
    #[serde(default, deserialize_with = "comma_list")]
    pub skipped_metrics: Vec<String>,
}

impl TenantConfig {
    fn from_ini(section: &str, props: &Properties) -> Result<Self, ConfigError> {
        let text = |key: &str| props.get(key).map(str::to_string);
        let path = |key: &str| props.get(key).map(PathBuf::from);
        let list = |key: &str| props.get(key).map(split_list).unwrap_or_default();

        let publish = match props.get("publish") {
            Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                section: section.to_string(),
                option: "publish".to_string(),
                value: value.to_string(),
            })?,
            None => false,
        };

        Ok(TenantConfig {
            poem_url: text("poem_url").unwrap_or_default(),
            poem_token: text("poem_token").unwrap_or_default(),
            webapi_token: text("webapi_token").unwrap_or_default(),
            metricprofiles: list("metricprofiles"),
            publish,
            publisher_queue: text("publisher_queue"),
            topology_groups_filter: text("topology_groups_filter"),
            topology_endpoints_filter: text("topology_endpoints_filter"),
            topology: path("topology"),
            secrets: text("secrets"),
            agents_configuration: path("agents_configuration"),
            subscription: text("subscription"),
            namespace: text("namespace"),
            skipped_metrics: list("skipped_metrics"),
        })
    }

    pub fn subscription_mode(&self, tenant: &str) -> Result<SubscriptionMode, ConfigError> {
        let Some(value) = self.subscription.as_deref().map(str::trim) else {
            return Ok(SubscriptionMode::default());
        };

        match value {
            "hostname" => Ok(SubscriptionMode::Hostname),
            "hostname_with_id" => Ok(SubscriptionMode::HostnameWithId),
            "servicetype" => Ok(SubscriptionMode::Servicetype),
            "entity" => Ok(SubscriptionMode::Entity),
            other => Err(ConfigError::InvalidValue {
                section: tenant.to_string(),
                option: "subscription".to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Namespace the tenant's objects live in.
    pub fn namespace<'a>(&'a self, tenant: &'a str) -> &'a str {
        self.namespace
            .as_deref()
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(tenant)
    }

    pub fn options(&self, tenant: &str) -> Result<TenantOptions, ConfigError> {
        Ok(TenantOptions {
            metric_profiles: self.metricprofiles.clone(),
            publish: self.publish,
            publisher_queue: non_empty(&self.publisher_queue),
            secrets: non_empty(&self.secrets),
            subscription: self.subscription_mode(tenant)?,
            agents: Default::default(),
            skipped_metrics: self.skipped_metrics.clone(),
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Deserialize, Debug)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub tenants: IndexMap<String, TenantConfig>,
}

impl Config {
    /// Loads `.ini` and `.conf` files as INI sections, anything else as YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if is_ini(path) {
            let contents = std::fs::read_to_string(path)?;
            let ini = Ini::load_from_str_opt(&contents, ini_options())?;
            return Config::from_ini(&ini);
        }

        let file = File::open(path)?;
        let data = serde_yaml::from_reader(file)?;

        Ok(data)
    }

    /// `GENERAL`, `LOGGING` and `METRICS` are reserved; every other section is a tenant.
    pub fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Config {
            general: GeneralConfig::default(),
            logging: LoggingConfig::default(),
            metrics: None,
            tenants: IndexMap::new(),
        };

        for (section, props) in ini.iter() {
            let Some(section) = section else {
                continue;
            };
            let text = |key: &str| props.get(key).map(str::to_string);

            match section {
                "GENERAL" => {
                    config.general = GeneralConfig {
                        sensu_url: text("sensu_url").unwrap_or_default(),
                        sensu_token: text("sensu_token").unwrap_or_default(),
                        webapi_url: text("webapi_url").unwrap_or_default(),
                    }
                }
                "LOGGING" => {
                    config.logging = LoggingConfig {
                        level: text("level"),
                        sentry_dsn: text("sentry_dsn"),
                    }
                }
                "METRICS" => {
                    let statsd_host = text("statsd_host").ok_or_else(|| ConfigError::MissingOption {
                        section: section.to_string(),
                        option: "statsd_host".to_string(),
                    })?;
                    let port = props.get("statsd_port").unwrap_or_default();
                    let statsd_port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                        section: section.to_string(),
                        option: "statsd_port".to_string(),
                        value: port.to_string(),
                    })?;
                    config.metrics = Some(MetricsConfig {
                        statsd_host,
                        statsd_port,
                    });
                }
                tenant => {
                    config
                        .tenants
                        .insert(tenant.to_string(), TenantConfig::from_ini(tenant, props)?);
                }
            }
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let general = &self.general;
        required("general", "sensu_url", &general.sensu_url)?;
        required("general", "sensu_token", &general.sensu_token)?;
        required("general", "webapi_url", &general.webapi_url)?;
        url("general", "sensu_url", &general.sensu_url)?;
        url("general", "webapi_url", &general.webapi_url)?;

        if self.tenants.is_empty() {
            return Err(ConfigError::MissingOption {
                section: "tenants".to_string(),
                option: "<tenant>".to_string(),
            });
        }

        for (name, tenant) in &self.tenants {
            required(name, "poem_url", &tenant.poem_url)?;
            required(name, "poem_token", &tenant.poem_token)?;
            required(name, "webapi_token", &tenant.webapi_token)?;
            url(name, "poem_url", &tenant.poem_url)?;
            if tenant.metricprofiles.is_empty() {
                return Err(ConfigError::MissingOption {
                    section: name.clone(),
                    option: "metricprofiles".to_string(),
                });
            }
            tenant.subscription_mode(name)?;
        }

        Ok(())
    }

    /// The tenants a command applies to, in file order.
    pub fn select(&self, only: Option<&str>) -> Result<Vec<(&str, &TenantConfig)>, ConfigError> {
        match only {
            Some(name) => self
                .tenants
                .get_key_value(name)
                .map(|(name, tenant)| vec![(name.as_str(), tenant)])
                .ok_or_else(|| ConfigError::MissingTenant(name.to_string())),
            None => Ok(self
                .tenants
                .iter()
                .map(|(name, tenant)| (name.as_str(), tenant))
                .collect()),
        }
    }

    /// Namespace of the named tenant, or of the only tenant when none is named.
    pub fn tenant_namespace(&self, only: Option<&str>) -> Result<&str, ConfigError> {
        let selected = self.select(only)?;
        if let [(name, tenant)] = selected[..] {
            return Ok(tenant.namespace(name));
        }
        Err(ConfigError::TenantRequired)
    }
}

fn required(section: &str, option: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingOption {
            section: section.to_string(),
            option: option.to_string(),
        });
    }
    Ok(())
}

fn url(section: &str, option: &str, value: &str) -> Result<(), ConfigError> {
    Url::parse(value.trim()).map_err(|_| ConfigError::InvalidValue {
        section: section.to_string(),
        option: option.to_string(),
        value: value.to_string(),
    })?;
    Ok(())
}

fn is_ini(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "ini" || ext == "conf")
}

/// Values are taken verbatim: filters and paths may carry quotes and backslashes.
fn ini_options() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..Default::default()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Some(true),
        "0" | "no" | "false" | "off" => Some(false),
        _ => None,
    }
}

fn split_list(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts either a YAML list or a comma separated string.
fn comma_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<ListOrString>::deserialize(deserializer)? {
        Some(ListOrString::List(items)) => items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Some(ListOrString::Joined(joined)) => split_list(&joined),
        None => vec![],
    })
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("could not parse config: {0}")]
    IniParseError(#[from] ini::ParseError),
    #[error("tenant {0} not found in configuration")]
    MissingTenant(String),
    #[error("several tenants configured, --tenant is required")]
    TenantRequired,
    #[error("missing option {option} in section {section}")]
    MissingOption { section: String, option: String },
    #[error("invalid value {value:?} for option {option} in section {section}")]
    InvalidValue {
        section: String,
        option: String,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp_file(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        write!(tmp, "{}", s).expect("write yaml");

        tmp
    }

    const FULL: &str = r#"
        general:
            sensu_url: https://sensu.example.com:8080
            sensu_token: s3nsu
            webapi_url: https://api.argo.grnet.gr
        logging:
            level: debug
        metrics:
            statsd_host: 127.0.0.1
            statsd_port: 8125
        tenants:
            TENANT1:
                poem_url: https://tenant1.poem.example.com
                poem_token: p0em1
                webapi_token: w3bapi1
                metricprofiles: ARGO-MON, ARGO-MON-CRITICAL
                publish: true
                publisher_queue: /var/spool/argo/metrics
                topology_endpoints_filter: tags=monitored:1
                secrets: /etc/sensu/secrets
                subscription: hostname_with_id
                skipped_metrics: [generic.ssh.connect]
            TENANT2:
                poem_url: https://tenant2.poem.example.com
                poem_token: p0em2
                webapi_token: w3bapi2
                metricprofiles: [ARGO-MON]
                namespace: custom
        "#;

    #[test]
    fn test_full_config() {
        let tmp = write_tmp_file(FULL);
        let config = Config::from_file(tmp.path()).expect("load config");
        config.validate().expect("valid config");

        assert_eq!(config.general.sensu_token, "s3nsu");
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.metrics.as_ref().map(|m| m.statsd_port), Some(8125));

        let names: Vec<_> = config.tenants.keys().cloned().collect();
        assert_eq!(names, vec!["TENANT1", "TENANT2"]);

        let tenant1 = &config.tenants["TENANT1"];
        assert_eq!(tenant1.metricprofiles, vec!["ARGO-MON", "ARGO-MON-CRITICAL"]);
        assert_eq!(tenant1.namespace("TENANT1"), "TENANT1");

        let options = tenant1.options("TENANT1").unwrap();
        assert!(options.publish);
        assert_eq!(options.subscription, SubscriptionMode::HostnameWithId);
        assert_eq!(options.skipped_metrics, vec!["generic.ssh.connect"]);
        assert_eq!(options.secrets.as_deref(), Some("/etc/sensu/secrets"));

        let tenant2 = &config.tenants["TENANT2"];
        assert_eq!(tenant2.namespace("TENANT2"), "custom");
        assert!(!tenant2.publish);
        assert_eq!(
            tenant2.options("TENANT2").unwrap().subscription,
            SubscriptionMode::Servicetype
        );
    }

    #[test]
    fn test_missing_option() {
        let tmp = write_tmp_file(
            r#"
            general:
                sensu_url: https://sensu.example.com:8080
                sensu_token: s3nsu
                webapi_url: https://api.argo.grnet.gr
            tenants:
                TENANT1:
                    poem_url: https://tenant1.poem.example.com
                    webapi_token: w3bapi1
                    metricprofiles: ARGO-MON
            "#,
        );
        let config = Config::from_file(tmp.path()).unwrap();

        match config.validate() {
            Err(ConfigError::MissingOption { section, option }) => {
                assert_eq!(section, "TENANT1");
                assert_eq!(option, "poem_token");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn test_invalid_subscription() {
        let tmp = write_tmp_file(&FULL.replace("hostname_with_id", "everything"));
        let config = Config::from_file(tmp.path()).unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { option, value, .. })
                if option == "subscription" && value == "everything"
        ));
    }

    #[test]
    fn test_select() {
        let tmp = write_tmp_file(FULL);
        let config = Config::from_file(tmp.path()).unwrap();

        assert_eq!(config.select(None).unwrap().len(), 2);
        assert_eq!(config.select(Some("TENANT2")).unwrap()[0].0, "TENANT2");
        assert!(matches!(
            config.select(Some("TENANT3")),
            Err(ConfigError::MissingTenant(name)) if name == "TENANT3"
        ));

        assert_eq!(config.tenant_namespace(Some("TENANT2")).unwrap(), "custom");
        assert!(matches!(
            config.tenant_namespace(None),
            Err(ConfigError::TenantRequired)
        ));
    }

    const FULL_INI: &str = r#"
[GENERAL]
sensu_url = https://sensu.example.com:8080
sensu_token = s3nsu
webapi_url = https://api.argo.grnet.gr

[METRICS]
statsd_host = 127.0.0.1
statsd_port = 8125

[TENANT1]
poem_url = https://tenant1.poem.example.com
poem_token = p0em1
webapi_token = w3bapi1
metricprofiles = ARGO-MON, ARGO-MON-CRITICAL
publish = True
topology_groups_filter = type=NGI&tags=certification:Certified
secrets = /etc/sensu/secrets
subscription = hostname_with_id
skipped_metrics = generic.ssh.connect

[TENANT2]
poem_url = https://tenant2.poem.example.com
poem_token = p0em2
webapi_token = w3bapi2
metricprofiles = ARGO-MON
namespace = custom
"#;

    fn write_tmp_ini(s: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::Builder::new()
            .suffix(".conf")
            .tempfile()
            .expect("create temp file");
        write!(tmp, "{}", s).expect("write ini");

        tmp
    }

    #[test]
    fn test_ini_config() {
        let tmp = write_tmp_ini(FULL_INI);
        let config = Config::from_file(tmp.path()).expect("load config");
        config.validate().expect("valid config");

        assert_eq!(config.general.sensu_url, "https://sensu.example.com:8080");
        assert_eq!(config.metrics.as_ref().map(|m| m.statsd_port), Some(8125));

        let names: Vec<_> = config.tenants.keys().cloned().collect();
        assert_eq!(names, vec!["TENANT1", "TENANT2"]);

        let tenant1 = &config.tenants["TENANT1"];
        assert_eq!(tenant1.metricprofiles, vec!["ARGO-MON", "ARGO-MON-CRITICAL"]);
        assert_eq!(
            tenant1.topology_groups_filter.as_deref(),
            Some("type=NGI&tags=certification:Certified")
        );

        let options = tenant1.options("TENANT1").unwrap();
        assert!(options.publish);
        assert_eq!(options.subscription, SubscriptionMode::HostnameWithId);
        assert_eq!(options.skipped_metrics, vec!["generic.ssh.connect"]);

        let tenant2 = &config.tenants["TENANT2"];
        assert!(!tenant2.publish);
        assert_eq!(tenant2.namespace("TENANT2"), "custom");
    }

    #[test]
    fn test_ini_invalid_values() {
        let tmp = write_tmp_ini(&FULL_INI.replace("publish = True", "publish = maybe"));
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::InvalidValue { section, option, .. })
                if section == "TENANT1" && option == "publish"
        ));

        let tmp = write_tmp_ini("[GENERAL\nsensu_url = x\n");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::IniParseError(_))
        ));
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/scg.yaml")),
            Err(ConfigError::LoadError(_))
        ));

        let tmp = write_tmp_file("general: [");
        assert!(matches!(
            Config::from_file(tmp.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
