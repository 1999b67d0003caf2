//! Configuration.
//!
//! Settings come from a YAML file (path in `PLAINWIRE_CONFIG`, default
//! `plainwire.yaml`, optional) with every field defaulted, then the `LISTEN`
//! environment variable overrides the server listen address.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "plainwire.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Root of the tree served to GET requests.
    pub public_dir: PathBuf,
    /// Where POST bodies are stored.
    pub receive_dir: PathBuf,
    /// Target of the redirect issued for the root.
    pub index_file: String,
    pub server_name: String,
    pub keep_alive_timeout_ms: u64,
    /// Upper bound on each readiness wait.
    pub poll_interval_ms: u64,
    /// A connection that sends this much without ending its header block is dropped.
    pub max_header_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8089".to_string(),
            public_dir: PathBuf::from("public"),
            receive_dir: PathBuf::from("receive"),
            index_file: "index.html".to_string(),
            server_name: concat!("plainwire/", env!("CARGO_PKG_VERSION")).to_string(),
            keep_alive_timeout_ms: 10_000,
            poll_interval_ms: 1,
            max_header_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_millis(self.keep_alive_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub default_host: String,
    pub default_port: u16,
    /// Where fetched bodies are saved.
    pub receive_dir: PathBuf,
    /// Bound on connecting, sending, and waiting for the first response bytes.
    pub io_timeout_ms: u64,
    /// Quiet period after which a response is considered complete.
    pub settle_ms: u64,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_host: "127.0.0.1".to_string(),
            default_port: 8089,
            receive_dir: PathBuf::from("receive"),
            io_timeout_ms: 5_000,
            settle_ms: 50,
            max_redirects: 20,
        }
    }
}

impl ClientConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Config {
    /// Loads the configuration file if present, then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("PLAINWIRE_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let path = Path::new(&path);

        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Applies variable overrides; `lookup` maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(listen_addr) = lookup("LISTEN") {
            self.server.listen_addr = listen_addr;
        }
    }
}
