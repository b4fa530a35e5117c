use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::cert::retry::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_output")]
    pub output: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
fn default_log_output() -> String { "stderr".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
            file_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SupervisorSettings {
    /// Acquisition gives up once the attempt number exceeds this
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Longest single sleep of the expiry watcher
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    /// Environment variables withheld from the child. `JWT` is always
    /// withheld; these come on top of it.
    #[serde(default)]
    pub strip_env: Vec<String>,
}

fn default_max_attempts() -> u32 { DEFAULT_MAX_ATTEMPTS }
fn default_max_wait_secs() -> u64 { 24 * 60 * 60 }

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            max_wait_secs: default_max_wait_secs(),
            strip_env: Vec::new(),
        }
    }
}

impl SupervisorSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerSettings {
    /// Listen address; a bare `:port` binds every interface
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_acme_file")]
    pub acme_file: String,
    /// Token verification key: a PEM public key, or an HMAC secret
    #[serde(default = "default_public_key")]
    pub public_key: String,
}

fn default_address() -> String { ":80".to_string() }
fn default_acme_file() -> String { "/acme/acme.json".to_string() }
fn default_public_key() -> String { "public.key".to_string() }

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            acme_file: default_acme_file(),
            public_key: default_public_key(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Load the config file when it exists, defaults otherwise
pub fn load_or_default(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

pub fn validate_config(config: &Config) -> Result<()> {
    let logging = &config.logging;
    if !matches!(logging.level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        anyhow::bail!("Invalid log level: {}", logging.level);
    }
    if !matches!(logging.format.as_str(), "text" | "json") {
        anyhow::bail!("Invalid log format: {}", logging.format);
    }
    match logging.output.as_str() {
        "stderr" | "console" => {}
        "file" => {
            if logging.file_path.as_deref().map_or(true, str::is_empty) {
                anyhow::bail!("logging.file_path is required when output is \"file\"");
            }
        }
        other => anyhow::bail!("Invalid log output: {}", other),
    }

    if config.supervisor.max_wait_secs == 0 {
        anyhow::bail!("supervisor.max_wait_secs must be greater than zero");
    }

    crate::api::server::parse_listen_addr(&config.server.address)
        .with_context(|| format!("Invalid server address: {}", config.server.address))?;

    Ok(())
}
