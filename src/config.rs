use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sampling: SamplingLimits,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Wall-clock budget for one request, generation included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The inference runtime that actually runs the model.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub provider: crate::llm::Provider,
    /// Defaults to the provider's usual local address.
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    pub api_key_env: Option<String>,
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
    /// Reconnect attempts when the runtime refuses the connection. A request
    /// that reached the runtime is never resent.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    /// Generate calls allowed in flight against the runtime at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: crate::llm::Provider::default(),
            base_url: None,
            model: default_model(),
            api_key_env: None,
            timeout_secs: default_backend_timeout(),
            connect_retries: default_connect_retries(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Upper bounds on caller-supplied sampling parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct SamplingLimits {
    #[serde(default = "default_max_temperature")]
    pub max_temperature: f64,
    #[serde(default = "default_max_tokens_limit")]
    pub max_tokens_limit: u32,
}

impl Default for SamplingLimits {
    fn default() -> Self {
        Self {
            max_temperature: default_max_temperature(),
            max_tokens_limit: default_max_tokens_limit(),
        }
    }
}

// Defaults
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5000
}
fn default_request_timeout() -> u64 {
    600
}
fn default_max_body_bytes() -> usize {
    crate::server::DEFAULT_MAX_BODY_BYTES
}
fn default_model() -> String {
    "mlx-community/c4ai-command-r-v01-4bit".into()
}
fn default_backend_timeout() -> u64 {
    600
}
fn default_connect_retries() -> u32 {
    2
}
fn default_max_concurrent() -> usize {
    1
}
fn default_max_temperature() -> f64 {
    1.0
}
fn default_max_tokens_limit() -> u32 {
    131_072
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content).map_err(|e| Error::config(format!("Failed to parse config: {e}")))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self
            .backend
            .base_url
            .as_deref()
            .is_some_and(|u| u.trim().is_empty())
        {
            return Err(Error::config("backend.base_url must not be empty"));
        }
        if self.backend.model.trim().is_empty() {
            return Err(Error::config("backend.model must not be empty"));
        }
        if self.backend.max_concurrent == 0 {
            return Err(Error::config("backend.max_concurrent must be at least 1"));
        }
        if self.backend.timeout_secs == 0 || self.server.request_timeout_secs == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        if !self.sampling.max_temperature.is_finite() || self.sampling.max_temperature < 0.0 {
            return Err(Error::config(
                "sampling.max_temperature must be a non-negative number",
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::config("server.max_body_bytes must be at least 1"));
        }
        if self.sampling.max_tokens_limit == 0 {
            return Err(Error::config("sampling.max_tokens_limit must be at least 1"));
        }
        Ok(())
    }
}
