use crate::errors::SourceError;
use generator::poem::{DefaultPort, MetricOverrides, RawMetrics};
use reqwest::Url;
use serde::de::DeserializeOwned;

const METRICS_PATH: &str = "api/v2/metrics";
const OVERRIDES_PATH: &str = "api/v2/metricoverrides";
const DEFAULT_PORTS_PATH: &str = "api/v2/default_ports";

/// Client of a tenant's POEM instance.
#[derive(Clone)]
pub struct PoemClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl PoemClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        PoemClient {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub async fn metrics(&self) -> Result<RawMetrics, SourceError> {
        self.get(METRICS_PATH).await
    }

    pub async fn overrides(&self) -> Result<MetricOverrides, SourceError> {
        self.get(OVERRIDES_PATH).await
    }

    pub async fn default_ports(&self) -> Result<Vec<DefaultPort>, SourceError> {
        self.get(DEFAULT_PORTS_PATH).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = format!("{}/{path}", self.base_url);
        let parsed = Url::parse(&url).map_err(|source| SourceError::InvalidUrl {
            url: url.clone(),
            source,
        })?;

        let response = self
            .client
            .get(parsed)
            .header("x-api-key", &self.token)
            .send()
            .await
            .map_err(SourceError::Poem)?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                url,
                status: response.status(),
            });
        }

        response.json::<T>().await.map_err(SourceError::Poem)
    }
}
