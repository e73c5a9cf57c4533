//! Pool configuration.
//!
//! A [`PoolConfig`] is supplied once, before the pool starts, and is
//! immutable afterwards.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding [`PoolConfig::workers`].
pub const ENV_WORKERS: &str = "PIPERUN_WORKERS";
/// Environment variable overriding [`PoolConfig::admission_timeout`], in milliseconds.
pub const ENV_ADMISSION_TIMEOUT_MS: &str = "PIPERUN_ADMISSION_TIMEOUT_MS";
/// Environment variable overriding [`PoolConfig::completion_timeout`], in milliseconds.
pub const ENV_COMPLETION_TIMEOUT_MS: &str = "PIPERUN_COMPLETION_TIMEOUT_MS";
/// Environment variable overriding [`PoolConfig::shell`].
pub const ENV_SHELL: &str = "PIPERUN_SHELL";

/// Tunables for a [`Pool`](crate::Pool).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of jobs that may run in parallel.
    pub workers: usize,
    /// Maximum time a job may wait for a free worker.
    pub admission_timeout: Duration,
    /// Maximum time a worker waits for the command to finish.
    pub completion_timeout: Duration,
    /// Shell used to interpret command strings (`<shell> -c <command>`).
    pub shell: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            admission_timeout: Duration::from_millis(500),
            completion_timeout: Duration::from_millis(500),
            shell: "sh".to_string(),
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Check that the configuration can start a pool.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.shell.trim().is_empty() {
            return Err(Error::InvalidConfig("shell must not be empty".to_string()));
        }
        Ok(())
    }

    /// Defaults overlaid with the `PIPERUN_*` environment variables.
    ///
    /// Values are parsed but not validated, so callers can layer further
    /// overrides before [`PoolConfig::validate`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed by the `PIPERUN_*` names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_WORKERS) {
            config.workers = parse_number(ENV_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_ADMISSION_TIMEOUT_MS) {
            config.admission_timeout =
                Duration::from_millis(parse_number(ENV_ADMISSION_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_COMPLETION_TIMEOUT_MS) {
            config.completion_timeout =
                Duration::from_millis(parse_number(ENV_COMPLETION_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_SHELL) {
            config.shell = value;
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{key}: expected a number, got '{value}'")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.admission_timeout, Duration::from_millis(500));
        assert_eq!(config.completion_timeout, Duration::from_millis(500));
        assert_eq!(config.shell, "sh");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PoolConfig::default().with_workers(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_empty_shell_rejected() {
        let config = PoolConfig::default().with_shell("  ");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_lookup_overlay() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_WORKERS, "8"),
            (ENV_ADMISSION_TIMEOUT_MS, "25"),
            (ENV_SHELL, "bash"),
        ]);
        let config = PoolConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.admission_timeout, Duration::from_millis(25));
        assert_eq!(config.completion_timeout, Duration::from_millis(500));
        assert_eq!(config.shell, "bash");
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let result = PoolConfig::from_lookup(|key| {
            (key == ENV_COMPLETION_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidConfig(msg)) if msg.contains("soon")));
    }

    #[test]
    fn test_lookup_rejects_out_of_range_workers() {
        let result = PoolConfig::from_lookup(|key| {
            (key == ENV_WORKERS).then(|| "99999999999999999999999".to_string())
        });
        assert!(matches!(result, Err(Error::InvalidConfig(msg)) if msg.contains(ENV_WORKERS)));
    }

    #[test]
    fn test_lookup_leaves_validation_to_caller() {
        let config =
            PoolConfig::from_lookup(|key| (key == ENV_WORKERS).then(|| "0".to_string())).unwrap();
        assert_eq!(config.workers, 0);
        assert!(config.validate().is_err());
    }
}
