use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;

use crate::error::Error;
use crate::http::parser::{MAX_BODY_SIZE, MAX_HEADER_SIZE};
use crate::middleware::{BodyParserOptions, JsonRpcOptions};

const DEFAULT_LISTEN: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub body_parser: BodyParserOptions,
    pub jsonrpc: JsonRpcConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Abort requests that have not produced a response within this many
    /// milliseconds. Unset means no transport timeout.
    pub request_timeout_ms: Option<u64>,
    pub keep_alive: bool,
    pub max_header_size: usize,
    /// Largest `Content-Length` the transport will buffer. Larger requests
    /// get `413` before their body is read.
    pub max_body_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JsonRpcConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub options: JsonRpcOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN.to_string(),
            request_timeout_ms: None,
            keep_alive: true,
            max_header_size: MAX_HEADER_SIZE,
            max_body_size: MAX_BODY_SIZE,
        }
    }
}

impl Default for JsonRpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            options: JsonRpcOptions::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Defaults, with the `LISTEN` environment variable overriding the
    /// listen address.
    pub fn load() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Reads a YAML config file. Missing keys take their defaults and
    /// `LISTEN` still overrides the listen address.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;

        let mut cfg = Self::from_yaml(&content)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(Error::Config("server.listen_addr must not be empty".into()));
        }
        if self.server.max_header_size == 0 {
            return Err(Error::Config("server.max_header_size must be greater than 0".into()));
        }
        if self.server.max_body_size == 0 {
            return Err(Error::Config("server.max_body_size must be greater than 0".into()));
        }
        if self.body_parser.max_body_size == 0 {
            return Err(Error::Config("body_parser.max_body_size must be greater than 0".into()));
        }
        if self.server.request_timeout_ms == Some(0) {
            return Err(Error::Config("server.request_timeout_ms must be greater than 0".into()));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(listen) = std::env::var("LISTEN") {
            self.server.listen_addr = listen;
        }
    }
}
