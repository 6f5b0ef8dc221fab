// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::rabbitmq::topology::QueueTopology;

pub const CONFIG_FILE_NAME: &str = "OrderFulfillment.json";

// Configuration structures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default = "default_queues")]
    pub queues: Vec<QueueTopology>,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub stock_service: StockServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    #[serde(default = "default_automatic_recovery")]
    pub automatic_recovery: bool,
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_ms: u64,
    #[serde(default = "default_timeout")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_heartbeat")]
    pub heartbeat_seconds: u16,
    #[serde(default = "default_connect_attempts")]
    pub max_connect_attempts: u32,
    #[serde(default = "default_connect_backoff")]
    pub connect_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockServiceConfig {
    #[serde(default = "default_stock_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub request_timeout_ms: u64,
}

// Default values
fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { 5672 }
fn default_vhost() -> String { "/".to_string() }
fn default_credential() -> String { "guest".to_string() }
fn default_automatic_recovery() -> bool { true }
fn default_recovery_interval() -> u64 { 10_000 }
fn default_timeout() -> u64 { 5000 }
fn default_heartbeat() -> u16 { 30 }
fn default_connect_attempts() -> u32 { 5 }
fn default_connect_backoff() -> u64 { 1000 }
fn default_sweep_interval() -> u64 { 30 }
fn default_stock_url() -> String { "http://localhost:5001".to_string() }

pub fn default_queues() -> Vec<QueueTopology> {
    vec![QueueTopology::order_created(), QueueTopology::stock_confirmed()]
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            vhost: default_vhost(),
            username: default_credential(),
            password: default_credential(),
            automatic_recovery: default_automatic_recovery(),
            recovery_interval_ms: default_recovery_interval(),
            connection_timeout_ms: default_timeout(),
            heartbeat_seconds: default_heartbeat(),
            max_connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self { sweep_interval_secs: default_sweep_interval() }
    }
}

impl Default for StockServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_stock_url(),
            request_timeout_ms: default_timeout(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            queues: default_queues(),
            supervisor: SupervisorConfig::default(),
            stock_service: StockServiceConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// AMQP URI for lapin. The vhost is percent-encoded so "/" becomes "%2f".
    pub fn amqp_uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}?heartbeat={}",
            encode_component(&self.username),
            encode_component(&self.password),
            self.host,
            self.port,
            encode_component(&self.vhost),
            self.heartbeat_seconds
        )
    }

    /// Same as [`amqp_uri`](Self::amqp_uri) with the password masked, for logs.
    pub fn redacted_uri(&self) -> String {
        format!(
            "amqp://{}:***@{}:{}/{}",
            encode_component(&self.username),
            self.host,
            self.port,
            encode_component(&self.vhost)
        )
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }
}

impl SupervisorConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02x}", byte)),
        }
    }
    encoded
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.broker.host.trim().is_empty() {
            return Err(anyhow!("Configuration error: broker.host cannot be empty"));
        }
        if self.broker.port == 0 {
            return Err(anyhow!("Configuration error: broker.port must be non-zero"));
        }
        if self.supervisor.sweep_interval_secs == 0 {
            return Err(anyhow!(
                "Configuration error: supervisor.sweep_interval_secs must be non-zero"
            ));
        }
        for queue in &self.queues {
            queue
                .validate()
                .map_err(|e| anyhow!("Configuration error in queues: {}", e))?;
        }
        Ok(())
    }
}

// Configuration loading and management functions
pub fn find_config_file() -> Option<PathBuf> {
    let local = Path::new(CONFIG_FILE_NAME).to_path_buf();
    let nested = Path::new("config").join(CONFIG_FILE_NAME);
    let locations = [("Current directory", local), ("Config directory", nested)];

    for (location_name, path) in locations {
        if path.exists() {
            debug!("Found config file in {}: {}", location_name, path.display());
            return Some(path);
        }
    }

    // Try the user's home directory
    if let Some(home_dir) = home::home_dir() {
        let home_config = home_dir.join(format!(".{}", CONFIG_FILE_NAME));
        if home_config.exists() {
            debug!("Found config file in home directory: {}", home_config.display());
            return Some(home_config);
        }
    }

    None
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let config_content = fs::read_to_string(path)
        .context(format!("Failed to read config file at {}", path.display()))?;

    let config: AppConfig = serde_json::from_str(&config_content)
        .context("Configuration file contains invalid JSON or missing required fields")?;

    config.validate()?;
    Ok(config)
}

/// Loads the configuration file if one is found, otherwise the built-in defaults.
pub fn load_config() -> Result<AppConfig> {
    match find_config_file() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            load_config_from(&path)
        }
        None => {
            info!("No {} found, using default configuration", CONFIG_FILE_NAME);
            Ok(AppConfig::default())
        }
    }
}

pub fn create_default_config_file(path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&AppConfig::default())
        .context("Failed to serialize default configuration")?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory at {}", parent.display()))?;
        }
    }

    fs::write(path, json)
        .context(format!("Failed to write configuration to {}", path.display()))?;

    info!("Created default configuration file at: {}", path.display());
    Ok(())
}
