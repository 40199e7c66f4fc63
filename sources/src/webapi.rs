use crate::errors::SourceError;
use generator::webapi::{Endpoint, MetricProfile, TopologyGroup};
use reqwest::Url;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;

const PROFILES_PATH: &str = "api/v2/metric_profiles";
const ENDPOINTS_PATH: &str = "api/v2/topology/endpoints";
const GROUPS_PATH: &str = "api/v2/topology/groups";

/// Every WebAPI response wraps its payload in `{status, data}`; only `data` is used.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Client of the shared WebAPI, authenticated per tenant.
#[derive(Clone)]
pub struct WebApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl WebApiClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        WebApiClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub async fn metric_profiles(&self) -> Result<Vec<MetricProfile>, SourceError> {
        self.get(PROFILES_PATH, None).await
    }

    pub async fn topology_endpoints(&self, filter: Option<&str>) -> Result<Vec<Endpoint>, SourceError> {
        self.get(ENDPOINTS_PATH, filter).await
    }

    pub async fn topology_groups(&self, filter: Option<&str>) -> Result<Vec<TopologyGroup>, SourceError> {
        self.get(GROUPS_PATH, filter).await
    }

    /// Endpoints, restricted to the subgroups of the filtered groups when a groups filter is set.
    pub async fn topology(
        &self,
        endpoints_filter: Option<&str>,
        groups_filter: Option<&str>,
    ) -> Result<Vec<Endpoint>, SourceError> {
        let endpoints = self.topology_endpoints(endpoints_filter).await?;

        let Some(groups_filter) = groups_filter else {
            return Ok(endpoints);
        };

        let groups = self.topology_groups(Some(groups_filter)).await?;
        let subgroups: HashSet<&str> = groups.iter().map(|g| g.subgroup.as_str()).collect();

        Ok(endpoints
            .into_iter()
            .filter(|endpoint| subgroups.contains(endpoint.group.as_str()))
            .collect())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, filter: Option<&str>) -> Result<T, SourceError> {
        let url = format!("{}/{path}", self.base_url);
        let mut parsed = Url::parse(&url).map_err(|source| SourceError::InvalidUrl {
            url: url.clone(),
            source,
        })?;
        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            parsed.set_query(Some(filter));
        }

        let response = self
            .client
            .get(parsed.clone())
            .header("x-api-key", &self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(SourceError::WebApi)?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url: parsed.to_string(),
                status: response.status(),
            });
        }

        Ok(response
            .json::<Envelope<T>>()
            .await
            .map_err(SourceError::WebApi)?
            .data)
    }
}
