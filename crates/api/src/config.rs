//! Process configuration for the API binary.

use std::net::SocketAddr;
use std::time::Duration;

use siteops_ai::DEFAULT_CACHE_TTL;
use siteops_automation::{ConfigError, EngineConfig};

pub const BIND_ADDR_VAR: &str = "SITEOPS_BIND_ADDR";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
/// Number of cached prediction results; unset or 0 disables the cache.
pub const INFERENCE_CACHE_SIZE_VAR: &str = "SITEOPS_INFERENCE_CACHE_SIZE";
pub const INFERENCE_CACHE_TTL_VAR: &str = "SITEOPS_INFERENCE_CACHE_TTL_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ServerConfigError {
    #[error("{BIND_ADDR_VAR} is not a socket address: '{0}'")]
    InvalidBindAddr(String),
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error(transparent)]
    Engine(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceCacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub engine: EngineConfig,
    pub inference_cache: Option<InferenceCacheConfig>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ServerConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ServerConfigError> {
        let raw = lookup(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw
            .trim()
            .parse()
            .map_err(|_| ServerConfigError::InvalidBindAddr(raw.clone()))?;

        let number = |var: &'static str| -> Result<Option<u64>, ServerConfigError> {
            lookup(var)
                .map(|value| {
                    value
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| ServerConfigError::InvalidNumber { var, value })
                })
                .transpose()
        };
        let inference_cache = match number(INFERENCE_CACHE_SIZE_VAR)? {
            None | Some(0) => None,
            Some(capacity) => Some(InferenceCacheConfig {
                capacity: capacity as usize,
                ttl: number(INFERENCE_CACHE_TTL_VAR)?
                    .filter(|secs| *secs > 0)
                    .map_or(DEFAULT_CACHE_TTL, Duration::from_secs),
            }),
        };

        Ok(Self {
            bind_addr,
            engine: EngineConfig::from_lookup(&lookup)?,
            inference_cache,
        })
    }
}
