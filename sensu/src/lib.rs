//! Sensu backend access and the reconciliation engine that converges it.

pub mod backend;
pub mod client;
pub mod errors;
pub mod metrics_defs;
pub mod reconcile;
pub mod resource;

#[cfg(any(test, feature = "testutils"))]
pub mod testutils;

pub use backend::{Backend, Kind};
pub use client::SensuClient;
pub use errors::{ReconcileError, SensuError};
pub use reconcile::{ReconcileSummary, Reconciler};
