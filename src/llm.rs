//! Generation capability: the [`Generator`] seam the orchestrator calls, the
//! sampling parameters it is called with, and [`LlmClient`], the
//! implementation that forwards prompts to an external inference runtime.

use crate::config::{BackendConfig, SamplingLimits};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::prompt::template::END_OF_TURN;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

pub const DEFAULT_TEMPERATURE: f64 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 131_072;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Sampling fields as the caller sent them; absent fields take the defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct SamplingOverrides {
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<i64>,
}

impl SamplingParams {
    pub fn resolve(overrides: SamplingOverrides, limits: &SamplingLimits) -> Result<Self> {
        let temperature = overrides.temperature.unwrap_or(DEFAULT_TEMPERATURE);
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(Error::invalid_parameter(format!(
                "temperature must be a number >= 0, got {temperature}"
            )));
        }
        if temperature > limits.max_temperature {
            return Err(Error::invalid_parameter(format!(
                "temperature must be at most {}, got {temperature}",
                limits.max_temperature
            )));
        }

        let max_tokens = match overrides.max_tokens {
            None => DEFAULT_MAX_TOKENS.min(limits.max_tokens_limit),
            Some(n) if n <= 0 => {
                return Err(Error::invalid_parameter(format!(
                    "max_tokens must be greater than 0, got {n}"
                )));
            }
            Some(n) => u32::try_from(n)
                .ok()
                .filter(|&n| n <= limits.max_tokens_limit)
                .ok_or_else(|| {
                    Error::invalid_parameter(format!(
                        "max_tokens must be at most {}, got {n}",
                        limits.max_tokens_limit
                    ))
                })?,
        };

        Ok(Self {
            temperature,
            max_tokens,
        })
    }
}

/// The model runtime as seen by the pipeline: one prompt in, one completion out.
///
/// Implementations own any serialization the underlying device needs; the
/// orchestrator makes exactly one call per request and never retries.
/// Failures should be reported as [`Error::GenerationFailure`].
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String>;

    /// Name reported by the health endpoint.
    fn model(&self) -> &str {
        "unknown"
    }
}

/// Runtime API flavour.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible `/completions` (mlx_lm.server, vLLM, llama.cpp's `/v1`).
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// llama.cpp native `/completion`.
    #[serde(rename = "llamacpp")]
    LlamaCpp,
}

impl Provider {
    fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "http://localhost:8080/v1",
            Self::LlamaCpp => "http://localhost:8080",
        }
    }

    fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_API_KEY",
            Self::LlamaCpp => "LLAMA_API_KEY",
        }
    }
}

pub struct LlmClient {
    provider: Provider,
    api_key: Option<String>,
    model: String,
    base_url: String,
    http: HttpClient,
    permits: Semaphore,
}

// -- OpenAI-compatible format --

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_tokens: u32,
    stop: &'a [&'a str],
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    text: String,
}

// -- llama.cpp format --

#[derive(Serialize)]
struct LlamaCppRequest<'a> {
    prompt: &'a str,
    temperature: f64,
    n_predict: u32,
    stop: &'a [&'a str],
}

#[derive(Deserialize)]
struct LlamaCppResponse {
    content: String,
}

impl LlmClient {
    pub fn new(
        provider: Provider,
        api_key: Option<String>,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
        connect_retries: u32,
        max_concurrent: usize,
    ) -> Result<Self> {
        let http = HttpClient::new(
            concat!("cmdr-serve/", env!("CARGO_PKG_VERSION")),
            timeout,
            connect_retries,
        )?;
        let base_url = base_url
            .unwrap_or_else(|| provider.default_base_url().into())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            provider,
            api_key: api_key.filter(|k| !k.is_empty()),
            model,
            base_url,
            http,
            permits: Semaphore::new(max_concurrent.max(1)),
        })
    }

    /// Build from config, reading the API key from the configured env var if set.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let env_var = config
            .api_key_env
            .clone()
            .unwrap_or_else(|| config.provider.default_api_key_env().into());
        let api_key = std::env::var(&env_var).ok();
        Self::new(
            config.provider.clone(),
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.connect_retries,
            config.max_concurrent,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post(&self, url: &str, body: &str) -> Result<String> {
        self.http.post_json(url, body, self.api_key.as_deref()).await
    }

    async fn complete_openai(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let request = OpenAiRequest {
            model: &self.model,
            prompt,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stop: &[END_OF_TURN],
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/completions", self.base_url);
        let response_text = self.post(&url, &body).await?;

        let resp: OpenAiResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse completion response: {e}")))?;

        resp.choices
            .into_iter()
            .next()
            .map(|c| c.text)
            .ok_or_else(|| Error::parse("completion response has no choices"))
    }

    async fn complete_llamacpp(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let request = LlamaCppRequest {
            prompt,
            temperature: params.temperature,
            n_predict: params.max_tokens,
            stop: &[END_OF_TURN],
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/completion", self.base_url);
        let response_text = self.post(&url, &body).await?;

        let resp: LlamaCppResponse = serde_json::from_str(&response_text)
            .map_err(|e| Error::parse(format!("parse llama.cpp response: {e}")))?;
        Ok(resp.content)
    }
}

#[async_trait]
impl Generator for LlmClient {
    async fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| Error::generation(format!("runtime unavailable: {e}")))?;

        debug!(
            provider = ?self.provider,
            model = %self.model,
            prompt_bytes = prompt.len(),
            "sending generation request"
        );

        let result = match self.provider {
            Provider::OpenAi => self.complete_openai(prompt, params).await,
            Provider::LlamaCpp => self.complete_llamacpp(prompt, params).await,
        };

        result.map_err(|e| match e {
            Error::GenerationFailure(_) => e,
            other => {
                warn!("runtime error: {other}");
                Error::generation(other.to_string())
            }
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
