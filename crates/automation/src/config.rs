//! Engine configuration.

use std::time::Duration;

use crate::action::RetryBackoff;

pub const TICK_INTERVAL_VAR: &str = "SITEOPS_TICK_INTERVAL_SECS";
pub const RETRAIN_INTERVAL_VAR: &str = "SITEOPS_RETRAIN_INTERVAL_SECS";
pub const IO_TIMEOUT_VAR: &str = "SITEOPS_IO_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a positive number of seconds, got '{value}'")]
    InvalidSeconds { var: &'static str, value: String },
}

/// Timers, timeouts and retraining parameters for the automation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Period of the rule-evaluation tick
    pub tick_interval: Duration,
    /// Period of the retraining sweep
    pub retrain_interval: Duration,
    /// Bound on every signal read and action sink call
    pub io_timeout: Duration,
    /// Maximum accuracy perturbation per retraining sweep
    pub retrain_step: f64,
    /// Backoff between action retries
    pub retry_backoff: RetryBackoff,
    /// How long `stop` waits for an in-flight tick before aborting it
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            retrain_interval: Duration::from_secs(24 * 60 * 60),
            io_timeout: Duration::from_secs(10),
            retrain_step: 0.01,
            retry_backoff: RetryBackoff::default(),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `SITEOPS_*_SECS` variables that are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`EngineConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secs = |var: &'static str| -> Result<Option<Duration>, ConfigError> {
            let Some(value) = lookup(var) else {
                return Ok(None);
            };
            match value.trim().parse::<u64>() {
                Ok(n) if n > 0 => Ok(Some(Duration::from_secs(n))),
                _ => Err(ConfigError::InvalidSeconds { var, value }),
            }
        };

        let mut config = Self::default();
        if let Some(d) = secs(TICK_INTERVAL_VAR)? {
            config.tick_interval = d;
        }
        if let Some(d) = secs(RETRAIN_INTERVAL_VAR)? {
            config.retrain_interval = d;
        }
        if let Some(d) = secs(IO_TIMEOUT_VAR)? {
            config.io_timeout = d;
        }
        Ok(config)
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_retrain_interval(mut self, interval: Duration) -> Self {
        self.retrain_interval = interval;
        self
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn with_retrain_step(mut self, step: f64) -> Self {
        self.retrain_step = step;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert_eq!(config.retrain_interval, Duration::from_secs(86_400));
        assert_eq!(config.io_timeout, Duration::from_secs(10));
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
    }

    #[test]
    fn lookup_overrides_set_variables() {
        let vars = HashMap::from([(TICK_INTERVAL_VAR, "2"), (IO_TIMEOUT_VAR, " 3 ")]);
        let config = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.tick_interval, Duration::from_secs(2));
        assert_eq!(config.io_timeout, Duration::from_secs(3));
        assert_eq!(config.retrain_interval, Duration::from_secs(86_400));
    }

    #[test]
    fn rejects_zero_and_garbage() {
        for bad in ["0", "soon", "-4"] {
            let err = EngineConfig::from_lookup(|k| (k == TICK_INTERVAL_VAR).then(|| bad.to_string())).unwrap_err();
            assert_eq!(
                err,
                ConfigError::InvalidSeconds {
                    var: TICK_INTERVAL_VAR,
                    value: bad.to_string(),
                }
            );
        }
    }
}
