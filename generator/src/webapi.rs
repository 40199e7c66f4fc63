//! Response schemas of the topology and profile source (WebAPI).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProfileService {
    pub service: String,
    #[serde(default)]
    pub metrics: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct MetricProfile {
    pub name: String,
    #[serde(default)]
    pub services: Vec<ProfileService>,
}

/// A monitored service endpoint.
///
/// Tags of interest are `info_URL`, `info_service_endpoint_URL`, `info_HOSTDN`,
/// `info_ID` and the `info_ext_*` extension tags.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Endpoint {
    pub group: String,
    pub service: String,
    pub hostname: String,
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

pub const EXTENSION_PREFIX: &str = "info_ext_";

impl Endpoint {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Extension tags as `(name without prefix, value)`.
    pub fn extensions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().filter_map(|(key, value)| {
            key.strip_prefix(EXTENSION_PREFIX)
                .map(|name| (name, value.trim()))
        })
    }
}

/// Entry of `/api/v2/topology/groups`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct TopologyGroup {
    pub group: String,
    pub subgroup: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_tags() {
        let endpoint: Endpoint = serde_json::from_value(serde_json::json!({
            "date": "2023-04-17",
            "group": "GRNET",
            "type": "SITES",
            "service": "web.check",
            "hostname": "argo.ni4os.eu",
            "tags": {
                "info_URL": "https://argo.ni4os.eu",
                "info_ext_ARGO_PATH": "/ui",
                "info_ext_PORT": " 8443 ",
                "monitored": "1",
                "info_HOSTDN": ""
            }
        }))
        .unwrap();

        assert_eq!(endpoint.tag("info_URL"), Some("https://argo.ni4os.eu"));
        assert_eq!(endpoint.tag("info_HOSTDN"), None);
        assert_eq!(
            endpoint.extensions().collect::<Vec<_>>(),
            vec![("ARGO_PATH", "/ui"), ("PORT", "8443")]
        );
    }
}
