//! Configuration parsing.
//!
//! The gateway reads an optional TOML file; every section and key has a
//! default, so an empty file (or no file at all) is a valid configuration
//! pointing at a local Milvus instance.
//!
//! ```toml
//! [milvus]
//! uri = "http://localhost:19530"
//! token = "root:Milvus"
//! db_name = "default"
//! timeout_secs = 30
//!
//! [store]
//! backend = "milvus"        # or "memory"
//!
//! [server]
//! transport = "stdio"       # or "http"
//! bind = "127.0.0.1:8000"
//! request_timeout_secs = 120
//!
//! [logging]
//! level = "info"
//! json = false
//! ```
//!
//! Command-line flags (see [`Overrides`]) take precedence over file values.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub milvus: MilvusConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MilvusConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_db_name")]
    pub db_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            token: None,
            db_name: default_db_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_uri() -> String {
    "http://localhost:19530".to_string()
}
fn default_db_name() -> String {
    "default".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

/// Which [`VectorStore`](milvus_gateway_core::VectorStore) implementation backs the gateway.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Milvus over its RESTful v2 API.
    #[default]
    Milvus,
    /// Process-local in-memory store (nothing persists).
    Memory,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// MCP over stdin/stdout.
    #[default]
    Stdio,
    /// Streamable HTTP MCP at `/mcp` plus the REST tool endpoints.
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line (or their environment variables).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub milvus_uri: Option<String>,
    pub milvus_token: Option<String>,
    pub db_name: Option<String>,
    pub backend: Option<Backend>,
    pub transport: Option<Transport>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
}

impl Config {
    /// Apply command-line overrides on top of file values.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(uri) = overrides.milvus_uri {
            self.milvus.uri = uri;
        }
        if let Some(token) = overrides.milvus_token {
            self.milvus.token = Some(token);
        }
        if let Some(db) = overrides.db_name {
            self.milvus.db_name = db;
        }
        if let Some(backend) = overrides.backend {
            self.store.backend = backend;
        }
        if let Some(transport) = overrides.transport {
            self.server.transport = transport;
        }
        if let Some(bind) = overrides.bind {
            self.server.bind = bind;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let uri = self.milvus.uri.trim();
        if uri.is_empty() {
            bail!("milvus.uri must not be empty");
        }
        if !(uri.starts_with("http://") || uri.starts_with("https://")) {
            bail!(
                "milvus.uri must start with http:// or https://, got '{}'",
                uri
            );
        }
        if self.milvus.db_name.trim().is_empty() {
            bail!("milvus.db_name must not be empty");
        }
        if self.milvus.timeout_secs == 0 {
            bail!("milvus.timeout_secs must be > 0");
        }
        if self.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be > 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.milvus.uri, "http://localhost:19530");
        assert_eq!(config.milvus.db_name, "default");
        assert_eq!(config.store.backend, Backend::Milvus);
        assert_eq!(config.server.transport, Transport::Stdio);
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parses_sections() {
        let config: Config = toml::from_str(
            r#"
[milvus]
uri = "https://milvus.internal:443"
token = "root:Milvus"

[store]
backend = "memory"

[server]
transport = "http"
bind = "0.0.0.0:9000"
"#,
        )
        .unwrap();
        assert_eq!(config.milvus.token.as_deref(), Some("root:Milvus"));
        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.server.transport, Transport::Http);
        assert_eq!(config.server.request_timeout_secs, 120);
    }

    #[test]
    fn test_rejects_unknown_section_and_bad_values() {
        assert!(toml::from_str::<Config>("[db]\npath = \"x\"").is_err());
        assert!(toml::from_str::<Config>("[store]\nbackend = \"redis\"").is_err());

        let mut config = Config::default();
        config.milvus.uri = "localhost:19530".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.milvus.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.milvus.db_name = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/milvus-mcp.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.milvus.timeout_secs, 30);
        assert!(config.milvus.token.is_none());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = Config::default();
        config.apply(Overrides {
            milvus_uri: Some("http://other:19530".into()),
            db_name: Some("analytics".into()),
            backend: Some(Backend::Memory),
            bind: Some("127.0.0.1:0".into()),
            ..Overrides::default()
        });
        assert_eq!(config.milvus.uri, "http://other:19530");
        assert_eq!(config.milvus.db_name, "analytics");
        assert_eq!(config.store.backend, Backend::Memory);
        assert_eq!(config.server.bind, "127.0.0.1:0");
        assert_eq!(config.server.transport, Transport::Stdio);
    }
}
