//! Pure transformation from upstream monitoring definitions into Sensu objects.
//!
//! Nothing in this crate performs I/O. Callers fetch the upstream data, bundle it
//! into [`TenantInputs`], build a [`Generator`] and ask it for a [`TenantPlan`].
//! Plans for tenants sharing a namespace are combined with [`merge::merge`].

pub mod attributes;
pub mod checks;
pub mod command;
pub mod context;
pub mod entities;
pub mod errors;
pub mod internals;
pub mod label;
pub mod merge;
pub mod plan;
pub mod poem;
pub mod records;
pub mod template;
pub mod webapi;

#[cfg(test)]
mod testutils;

pub use context::{ResolvedContext, SubscriptionMode, TenantInputs, TenantOptions};
pub use errors::GeneratorError;
pub use label::LabelName;
pub use plan::{Generator, NamespacePlan, TenantPlan};
