use crate::errors::SourceError;
use crate::files;
use crate::poem::PoemClient;
use crate::webapi::WebApiClient;
use generator::{TenantInputs, TenantOptions};
use std::path::PathBuf;

/// Where one tenant's upstream data comes from.
pub struct TenantSource {
    pub tenant: String,
    pub poem: PoemClient,
    pub webapi: WebApiClient,
    /// Local topology used instead of the WebAPI topology.
    pub topology_file: Option<PathBuf>,
    pub endpoints_filter: Option<String>,
    pub groups_filter: Option<String>,
    pub agents_file: Option<PathBuf>,
}

impl TenantSource {
    /// Fetches everything the generator needs for this tenant.
    ///
    /// Extra agent subscriptions from the agents file are added to `options.agents`.
    pub async fn fetch(&self, mut options: TenantOptions) -> Result<TenantInputs, SourceError> {
        let metrics = self.poem.metrics().await?;
        let overrides = self.poem.overrides().await?;
        let default_ports = self.poem.default_ports().await?;
        let profiles = self.webapi.metric_profiles().await?;

        let topology = match &self.topology_file {
            Some(path) => {
                tracing::debug!("{}: Reading topology from {}", self.tenant, path.display());
                files::load_topology_file(path)?
            }
            None => {
                self.webapi
                    .topology(self.endpoints_filter.as_deref(), self.groups_filter.as_deref())
                    .await?
            }
        };

        if let Some(path) = &self.agents_file {
            for (agent, subscriptions) in files::load_agents_file(path)? {
                let extras = options.agents.entry(agent).or_default();
                for subscription in subscriptions {
                    if !extras.contains(&subscription) {
                        extras.push(subscription);
                    }
                }
            }
        }

        tracing::debug!(
            "{}: Fetched {} metrics, {} profiles and {} endpoints",
            self.tenant,
            metrics.len(),
            profiles.len(),
            topology.len()
        );

        Ok(TenantInputs {
            tenant: self.tenant.clone(),
            metrics,
            overrides,
            default_ports,
            profiles,
            topology,
            options,
        })
    }
}
