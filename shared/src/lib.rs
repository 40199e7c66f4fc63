pub mod metrics_defs;

#[doc(hidden)]
pub use metrics;
