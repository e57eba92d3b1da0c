//! Authentication core: local password accounts, Google sign-in, HS256
//! access tokens and rotating refresh sessions.

pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AuthConfig;
pub use services::{AuthError, AuthService, ErrorKind};

/// Install the process-wide tracing subscriber described by `config`.
pub fn init_tracing(config: &AuthConfig) -> Result<(), anyhow::Error> {
    service_core::observability::init_tracing(
        &config.common.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )
}
