//! Operator configuration
//!
//! Read once at startup from environment variables; every setting has a
//! default so the operator runs unconfigured.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default metrics port
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Runtime settings for the operator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Restrict the watch to one namespace; all namespaces when `None`
    pub watch_namespace: Option<String>,
    /// Deadline for a single apply or cleanup call
    pub action_timeout: Duration,
    /// Simulated painting time
    pub paint_duration: Duration,
    /// Simulated cleanup time
    pub cleanup_duration: Duration,
    /// First retry delay after a failed pass
    pub retry_base: Duration,
    /// Upper bound for the retry delay
    pub retry_max: Duration,
    /// Publish Kubernetes Events in addition to logs
    pub publish_events: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            watch_namespace: None,
            action_timeout: Duration::from_secs(60),
            paint_duration: Duration::from_secs(3),
            cleanup_duration: Duration::from_secs(3),
            retry_base: Duration::from_millis(500),
            retry_max: Duration::from_secs(300),
            publish_events: true,
        }
    }
}

impl OperatorConfig {
    /// Build from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            metrics_port: parse(&lookup, "METRICS_PORT")?.unwrap_or(defaults.metrics_port),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.trim().is_empty()),
            action_timeout: parse(&lookup, "ACTION_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.action_timeout),
            paint_duration: parse(&lookup, "PAINT_DURATION_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.paint_duration),
            cleanup_duration: parse(&lookup, "CLEANUP_DURATION_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.cleanup_duration),
            retry_base: parse(&lookup, "RETRY_BASE_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_base),
            retry_max: parse(&lookup, "RETRY_MAX_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_max),
            publish_events: parse(&lookup, "PUBLISH_EVENTS")?.unwrap_or(defaults.publish_events),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.action_timeout.is_zero() {
            return Err(Error::config("ACTION_TIMEOUT_SECS must be greater than zero"));
        }
        if self.retry_base.is_zero() {
            return Err(Error::config("RETRY_BASE_MS must be greater than zero"));
        }
        if self.retry_max < self.retry_base {
            return Err(Error::config("RETRY_MAX_SECS must not be below RETRY_BASE_MS"));
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::config(format!("Invalid {} '{}': {}", key, raw, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<OperatorConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        OperatorConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(config(&[]).unwrap(), OperatorConfig::default());
    }

    #[test]
    fn values_are_read_from_environment() {
        let cfg = config(&[
            ("METRICS_PORT", "9090"),
            ("WATCH_NAMESPACE", "fruit"),
            ("ACTION_TIMEOUT_SECS", "10"),
            ("PAINT_DURATION_MS", "0"),
            ("RETRY_BASE_MS", "250"),
            ("RETRY_MAX_SECS", "30"),
            ("PUBLISH_EVENTS", "false"),
        ])
        .unwrap();
        assert_eq!(cfg.metrics_port, 9090);
        assert_eq!(cfg.watch_namespace.as_deref(), Some("fruit"));
        assert_eq!(cfg.action_timeout, Duration::from_secs(10));
        assert_eq!(cfg.paint_duration, Duration::ZERO);
        assert_eq!(cfg.retry_base, Duration::from_millis(250));
        assert_eq!(cfg.retry_max, Duration::from_secs(30));
        assert!(!cfg.publish_events);
    }

    #[test]
    fn blank_namespace_means_all_namespaces() {
        assert_eq!(config(&[("WATCH_NAMESPACE", " ")]).unwrap().watch_namespace, None);
    }

    #[test]
    fn unparsable_value_is_config_error() {
        let err = config(&[("METRICS_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("METRICS_PORT"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(config(&[("ACTION_TIMEOUT_SECS", "0")]).is_err());
    }
}
