//! Readers for the upstream data a tenant's configuration is generated from.
//!
//! [`PoemClient`] serves metric definitions and overrides, [`WebApiClient`] serves
//! metric profiles and topology, and [`files`] covers the optional local topology
//! and agents files. [`TenantSource`] ties them together into
//! [`generator::TenantInputs`].

pub mod errors;
pub mod files;
pub mod poem;
pub mod tenant;
pub mod webapi;

pub use errors::SourceError;
pub use poem::PoemClient;
pub use tenant::TenantSource;
pub use webapi::WebApiClient;
