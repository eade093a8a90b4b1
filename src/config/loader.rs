//! Configuration loading from disk and the environment.

use std::path::Path;
use std::fs;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::error::ProxyError;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
}

impl From<ConfigError> for ProxyError {
    fn from(err: ConfigError) -> Self {
        ProxyError::Configuration(err.to_string())
    }
}

/// Environment variables that override file values.
pub const ENV_FAILURE_DETECTION_TIME_MS: &str = "FAILOVER_PROXY_FAILURE_DETECTION_TIME_MS";
pub const ENV_FAILURE_DETECTION_INTERVAL_MS: &str = "FAILOVER_PROXY_FAILURE_DETECTION_INTERVAL_MS";
pub const ENV_FAILURE_DETECTION_COUNT: &str = "FAILOVER_PROXY_FAILURE_DETECTION_COUNT";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "FAILOVER_PROXY_CONNECT_TIMEOUT_MS";
pub const ENV_FAILOVER_TIMEOUT_MS: &str = "FAILOVER_PROXY_FAILOVER_TIMEOUT_MS";
pub const ENV_MONITOR_DISPOSAL_TIME_MS: &str = "FAILOVER_PROXY_MONITOR_DISPOSAL_TIME_MS";

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let mut config: ProxyConfig = toml::from_str(&content)?;

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), hosts = config.cluster.hosts.len(), "Configuration loaded");
    Ok(config)
}

/// Apply overrides from a variable lookup (the process environment in production).
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
        value.trim().parse().map_err(|_| ConfigError::Env { name, value })
    }

    if let Some(v) = lookup(ENV_FAILURE_DETECTION_TIME_MS) {
        config.monitoring.failure_detection_time_ms = parse(ENV_FAILURE_DETECTION_TIME_MS, v)?;
    }
    if let Some(v) = lookup(ENV_FAILURE_DETECTION_INTERVAL_MS) {
        config.monitoring.failure_detection_interval_ms = parse(ENV_FAILURE_DETECTION_INTERVAL_MS, v)?;
    }
    if let Some(v) = lookup(ENV_FAILURE_DETECTION_COUNT) {
        config.monitoring.failure_detection_count = parse(ENV_FAILURE_DETECTION_COUNT, v)?;
    }
    if let Some(v) = lookup(ENV_MONITOR_DISPOSAL_TIME_MS) {
        config.monitoring.monitor_disposal_time_ms = parse(ENV_MONITOR_DISPOSAL_TIME_MS, v)?;
    }
    if let Some(v) = lookup(ENV_CONNECT_TIMEOUT_MS) {
        config.failover.connect_timeout_ms = parse(ENV_CONNECT_TIMEOUT_MS, v)?;
    }
    if let Some(v) = lookup(ENV_FAILOVER_TIMEOUT_MS) {
        config.failover.timeout_ms = parse(ENV_FAILOVER_TIMEOUT_MS, v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            (ENV_FAILURE_DETECTION_INTERVAL_MS, "250"),
            (ENV_FAILURE_DETECTION_COUNT, " 5 "),
            (ENV_FAILOVER_TIMEOUT_MS, "10000"),
        ]
        .into_iter()
        .collect();

        let mut config = ProxyConfig::default();
        apply_env_overrides(&mut config, |name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(config.monitoring.failure_detection_interval_ms, 250);
        assert_eq!(config.monitoring.failure_detection_count, 5);
        assert_eq!(config.failover.timeout_ms, 10_000);
        assert_eq!(config.monitoring.failure_detection_time_ms, 30_000);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let mut config = ProxyConfig::default();
        let err = apply_env_overrides(&mut config, |name| {
            (name == ENV_FAILURE_DETECTION_COUNT).then(|| "-1".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains(ENV_FAILURE_DETECTION_COUNT));
    }

    #[test]
    fn test_load_config_reports_validation() {
        let path = std::env::temp_dir().join(format!("failover-proxy-{}.toml", uuid::Uuid::new_v4()));
        fs::write(&path, "[monitoring]\nfailure_detection_interval_ms = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("failure_detection_interval_ms"));

        fs::remove_file(&path).unwrap_or_default();
    }
}
