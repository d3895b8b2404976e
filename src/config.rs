//! Process configuration.
//!
//! Built once at startup from an optional YAML file plus environment
//! overrides, then shared read-only with every connection.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::proxy::rewrite::RewriteRule;

/// Environment variable naming an optional YAML config file.
pub const CONFIG_PATH_ENV: &str = "STREMMER_CONFIG";
/// Environment variable overriding the listen address.
pub const LISTEN_ENV: &str = "LISTEN";
/// Environment variable overriding the internal storage base URL.
pub const INTERNAL_BASE_ENV: &str = "MINIO_INTERNAL_BASE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upstream: UpstreamConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

/// Where the object store is reachable from the browser and from here.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Private address of the object store (scheme, host and port are used).
    pub internal_base: String,
    /// Hostnames under which the object store is published to browsers.
    pub public_hosts: Vec<String>,
    /// Ports under which the object store is published to browsers.
    pub public_ports: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub connect_timeout_secs: u64,
    /// Time allowed for the upstream to send its full response head.
    pub response_timeout_secs: u64,
    /// Longest pause tolerated between two body reads.
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            internal_base: "http://minio-old:9000".to_string(),
            public_hosts: vec!["localhost".to_string(), "127.0.0.1".to_string()],
            public_ports: vec![9100, 9000],
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
            response_timeout_secs: 30,
            idle_timeout_secs: 60,
        }
    }
}

impl Config {
    /// Loads configuration from `STREMMER_CONFIG` (if set) and applies the
    /// `LISTEN` and `MINIO_INTERNAL_BASE` overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path))?;
                Self::from_yaml(&raw).with_context(|| format!("invalid config file {}", path))?
            }
            Err(_) => Self::default(),
        };

        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let cfg: Config = serde_yaml::from_str(raw).context("failed to parse YAML config")?;
        Ok(cfg)
    }

    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var(LISTEN_ENV) {
            self.server.listen_addr = addr;
        }
        if let Ok(base) = std::env::var(INTERNAL_BASE_ENV) {
            if !base.is_empty() {
                self.storage.internal_base = base;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.is_empty() {
            anyhow::bail!("server.listen_addr must not be empty");
        }

        self.storage.internal_base_url()?;

        if self.upstream.connect_timeout_secs == 0
            || self.upstream.response_timeout_secs == 0
            || self.upstream.idle_timeout_secs == 0
        {
            anyhow::bail!("upstream timeouts must be greater than zero");
        }

        Ok(())
    }
}

impl StorageConfig {
    /// Parses and checks `internal_base`.
    pub fn internal_base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.internal_base)
            .with_context(|| format!("invalid storage.internal_base {:?}", self.internal_base))?;

        if url.scheme() != "http" {
            anyhow::bail!(
                "storage.internal_base must use http, got {:?}",
                url.scheme()
            );
        }
        if url.host_str().is_none() {
            anyhow::bail!("storage.internal_base has no host");
        }

        Ok(url)
    }

    pub fn rewrite_rule(&self) -> Result<RewriteRule> {
        Ok(RewriteRule::new(
            self.public_hosts.clone(),
            self.public_ports.clone(),
            self.internal_base_url()?,
        ))
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
