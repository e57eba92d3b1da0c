//! service-core: Shared infrastructure for the auth workspace.
pub mod config;
pub mod observability;

pub use tracing;
