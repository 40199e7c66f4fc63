//! One reload pass: every configured namespace fetched, generated and reconciled in turn.

use crate::config::{Config, ConfigError, TenantConfig};
use crate::metrics_defs::{NAMESPACE_SKIPPED, PASS_DURATION};
use generator::merge::merge;
use generator::{Generator, GeneratorError, TenantPlan};
use indexmap::IndexMap;
use sensu::{Backend, ReconcileError, ReconcileSummary, Reconciler};
use shared::{counter, histogram};
use sources::{PoemClient, SourceError, TenantSource, WebApiClient};
use std::sync::Arc;
use std::time::Instant;

#[derive(thiserror::Error, Debug)]
pub enum NamespaceError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Source(#[from] SourceError),
    #[error("{0}")]
    Generator(#[from] GeneratorError),
    #[error("{0}")]
    Reconcile(#[from] ReconcileError),
}

impl NamespaceError {
    /// Fatal errors abort the whole pass instead of skipping one namespace.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NamespaceError::Reconcile(e) if e.is_fatal())
    }
}

#[derive(Debug, Default)]
pub struct PassSummary {
    pub applied: Vec<(String, ReconcileSummary)>,
    pub skipped: Vec<String>,
}

pub struct Controller<'a> {
    config: &'a Config,
    reconciler: Reconciler,
}

impl<'a> Controller<'a> {
    pub fn new(config: &'a Config, backend: Arc<dyn Backend>) -> Self {
        Controller {
            config,
            reconciler: Reconciler::new(backend),
        }
    }

    /// Tenants grouped by effective namespace, both in configuration order.
    ///
    /// Selecting a tenant selects its whole namespace, since tenants sharing a
    /// namespace can only be reconciled together.
    pub fn namespaces(
        &self,
        only: Option<&str>,
    ) -> Result<IndexMap<&'a str, Vec<(&'a str, &'a TenantConfig)>>, ConfigError> {
        let wanted = match only {
            Some(name) => {
                let (name, tenant) = self.config.select(Some(name))?[0];
                Some(tenant.namespace(name))
            }
            None => None,
        };

        let mut namespaces: IndexMap<&str, Vec<(&str, &TenantConfig)>> = IndexMap::new();
        for (name, tenant) in self.config.select(None)? {
            let namespace = tenant.namespace(name);
            if wanted.is_some_and(|wanted| wanted != namespace) {
                continue;
            }
            namespaces.entry(namespace).or_default().push((name, tenant));
        }
        Ok(namespaces)
    }

    pub async fn reload(&self, only: Option<&str>) -> Result<PassSummary, NamespaceError> {
        let started = Instant::now();
        let namespaces = self.namespaces(only)?;

        let names: Vec<&str> = namespaces.keys().copied().collect();
        self.reconciler.ensure_namespaces(&names).await?;

        let mut pass = PassSummary::default();
        for (namespace, tenants) in &namespaces {
            match self.reconcile_namespace(namespace, tenants).await {
                Ok(summary) => pass.applied.push((namespace.to_string(), summary)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::error!("{namespace}: Skipping configuration: {e}");
                    counter!(NAMESPACE_SKIPPED).increment(1);
                    pass.skipped.push(namespace.to_string());
                }
            }
        }

        histogram!(PASS_DURATION).record(started.elapsed().as_secs_f64());
        Ok(pass)
    }

    async fn reconcile_namespace(
        &self,
        namespace: &str,
        tenants: &[(&str, &TenantConfig)],
    ) -> Result<ReconcileSummary, NamespaceError> {
        let mut plans: Vec<TenantPlan> = Vec::with_capacity(tenants.len());

        for (name, tenant) in tenants {
            let inputs = self.source(name, tenant).fetch(tenant.options(name)?).await?;
            let plan = Generator::new(&inputs)?.generate(namespace);
            plans.push(plan);
        }

        if plans.len() > 1 {
            tracing::info!(
                "{namespace}: Merging configuration of tenants {}",
                tenants.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ")
            );
        }

        let plan = merge(namespace, plans);
        tracing::debug!(
            "{namespace}: {} metric parameter overrides, {} host attribute overrides, secrets {}, publish {}",
            plan.parameter_overrides.len(),
            plan.host_attribute_overrides.len(),
            plan.secrets.as_deref().unwrap_or("none"),
            plan.publish
        );
        Ok(self.reconciler.apply(&plan).await?)
    }

    fn source(&self, name: &str, tenant: &TenantConfig) -> TenantSource {
        TenantSource {
            tenant: name.to_string(),
            poem: PoemClient::new(&tenant.poem_url, &tenant.poem_token),
            webapi: WebApiClient::new(&self.config.general.webapi_url, &tenant.webapi_token),
            topology_file: tenant.topology.clone(),
            endpoints_filter: tenant.topology_endpoints_filter.clone(),
            groups_filter: tenant.topology_groups_filter.clone(),
            agents_file: tenant.agents_configuration.clone(),
        }
    }
}
