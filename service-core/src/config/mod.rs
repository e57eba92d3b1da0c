use config::{Config as Cfg, File};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0} is required but not set")]
    Missing(String),

    #[error("{0} is required in production but not set")]
    MissingInProduction(String),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Deployment environment. Production turns every missing setting into an error.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn is_prod(&self) -> bool {
        *self == Environment::Prod
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Settings shared by every service process.
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub environment: Environment,
}

fn default_service_name() -> String {
    "auth-core".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Layered load: optional `configuration.*` file, then `APP__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Cfg::builder()
            .add_source(File::with_name("configuration").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Read an environment variable.
///
/// In production every key is mandatory; elsewhere `default` is used when the
/// variable is absent.
pub fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(ConfigError::MissingInProduction(key.to_string()))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(ConfigError::Missing(key.to_string()))
            }
        }
    }
}

/// Read and parse an environment variable, see [`get_env`].
pub fn parse_env<T>(key: &str, default: Option<&str>, is_prod: bool) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, default, is_prod)?
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            key: key.to_string(),
            reason: e.to_string(),
        })
}
