use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenv::dotenv;

use crate::config::AppConfig;

pub const RABBITMQ_HOST: &str = "RABBITMQ_HOST";
pub const RABBITMQ_PORT: &str = "RABBITMQ_PORT";
pub const RABBITMQ_VHOST: &str = "RABBITMQ_VHOST";
pub const RABBITMQ_USER: &str = "RABBITMQ_USER";
pub const RABBITMQ_PASSWORD: &str = "RABBITMQ_PASSWORD";
pub const RABBITMQ_AUTOMATIC_RECOVERY: &str = "RABBITMQ_AUTOMATIC_RECOVERY";
pub const RABBITMQ_RECOVERY_INTERVAL_MS: &str = "RABBITMQ_RECOVERY_INTERVAL_MS";
pub const SUPERVISOR_SWEEP_INTERVAL_SECS: &str = "SUPERVISOR_SWEEP_INTERVAL_SECS";
pub const STOCK_SERVICE_URL: &str = "STOCK_SERVICE_URL";

/// Loads `.env` (if present) and applies process environment overrides.
pub fn apply_env_overrides(config: AppConfig) -> Result<AppConfig> {
    dotenv().ok();
    apply_overrides_with(config, |key| env::var(key).ok())
}

/// Applies overrides from an arbitrary lookup; unparseable values are errors.
pub fn apply_overrides_with<F>(mut config: AppConfig, lookup: F) -> Result<AppConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(RABBITMQ_HOST) {
        config.broker.host = host;
    }
    if let Some(port) = parse_var(&lookup, RABBITMQ_PORT)? {
        config.broker.port = port;
    }
    if let Some(vhost) = lookup(RABBITMQ_VHOST) {
        config.broker.vhost = vhost;
    }
    if let Some(user) = lookup(RABBITMQ_USER) {
        config.broker.username = user;
    }
    if let Some(password) = lookup(RABBITMQ_PASSWORD) {
        config.broker.password = password;
    }
    if let Some(recovery) = parse_var(&lookup, RABBITMQ_AUTOMATIC_RECOVERY)? {
        config.broker.automatic_recovery = recovery;
    }
    if let Some(interval) = parse_var(&lookup, RABBITMQ_RECOVERY_INTERVAL_MS)? {
        config.broker.recovery_interval_ms = interval;
    }
    if let Some(sweep) = parse_var(&lookup, SUPERVISOR_SWEEP_INTERVAL_SECS)? {
        config.supervisor.sweep_interval_secs = sweep;
    }
    if let Some(url) = lookup(STOCK_SERVICE_URL) {
        config.stock_service.base_url = url;
    }

    config.validate()?;
    Ok(config)
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("Environment variable {} has invalid value '{}'", key, raw))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_apply() {
        let config = apply_overrides_with(
            AppConfig::default(),
            lookup_from(&[
                (RABBITMQ_HOST, "rabbit.internal"),
                (RABBITMQ_PORT, "5673"),
                (RABBITMQ_VHOST, "vhost_rust"),
                (RABBITMQ_AUTOMATIC_RECOVERY, "false"),
                (SUPERVISOR_SWEEP_INTERVAL_SECS, "5"),
            ]),
        )
        .unwrap();

        assert_eq!(config.broker.host, "rabbit.internal");
        assert_eq!(config.broker.port, 5673);
        assert_eq!(config.broker.vhost, "vhost_rust");
        assert!(!config.broker.automatic_recovery);
        assert_eq!(config.supervisor.sweep_interval_secs, 5);
    }

    #[test]
    fn test_no_overrides_keeps_defaults() {
        let config = apply_overrides_with(AppConfig::default(), |_| None).unwrap();
        assert_eq!(config.broker.port, 5672);
        assert_eq!(config.broker.recovery_interval_ms, 10_000);
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let result = apply_overrides_with(
            AppConfig::default(),
            lookup_from(&[(RABBITMQ_PORT, "not-a-port")]),
        );
        let message = result.unwrap_err().to_string();
        assert!(message.contains("RABBITMQ_PORT"));
    }
}
