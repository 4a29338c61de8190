//! Streaming model backends
//!
//! Every provider yields a lazy stream of `TokenChunk`s; the final chunk carries
//! aggregate token usage when the backend reports it.
//!
//! ## Modules
//!
//! - `chain`: Ranked provider chain with ordered failover
//! - `gemini`: Cloud provider (Google Generative Language API, SSE)
//! - `ollama`: Local provider (Ollama daemon, NDJSON)

mod chain;
mod gemini;
mod ollama;
mod prompt_utils;

#[cfg(test)]
pub(crate) mod scripted;

pub use chain::{
    AttemptRecord, ChainConfig, ChainStats, ChainedProvider, Generation, ProviderChain,
};
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;

pub use crate::types::{ErrorClassifier, FailureKind, ProviderError};

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

use crate::constants::generation as gen_constants;
use crate::types::{ExplainError, Result};

// =============================================================================
// Streaming Types
// =============================================================================

/// Token usage reported by a backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Input tokens (prompt)
    pub input_tokens: u64,
    /// Output tokens (response)
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens used (input + output)
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One increment of generated text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenChunk {
    pub text: String,
    /// Aggregate usage, present on the chunk that closes the stream
    pub usage: Option<TokenUsage>,
}

impl TokenChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// Lazy, provider-owned stream of generated chunks
pub type TokenStream<'a> =
    Pin<Box<dyn Stream<Item = std::result::Result<TokenChunk, ProviderError>> + Send + 'a>>;

/// Sampling parameters for one generation call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// 0.0 = deterministic, higher = more varied
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
}

impl GenerationParams {
    pub fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: gen_constants::EXPLANATION_TEMPERATURE,
            max_tokens: gen_constants::EXPLANATION_MAX_TOKENS,
        }
    }
}

// =============================================================================
// Provider Metadata
// =============================================================================

/// Where a provider runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Cloud,
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloud => write!(f, "cloud"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Snapshot of one configured provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub model: String,
    pub kind: ProviderKind,
    /// Position in the default attempt order (0 = tried first)
    pub rank: usize,
    pub available: bool,
}

/// Shared LLM provider type for use across the validator and the orchestrator.
pub type SharedProvider = Arc<dyn LlmProvider>;

// =============================================================================
// Provider Configuration
// =============================================================================

/// Settings for one backend
///
/// `api_key` is skipped on serialization and redacted from `Debug`; providers
/// hold it as a `SecretString` once built.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider type: "gemini", "ollama"
    pub provider: String,
    /// Backend model id; `None` picks the provider default
    pub model: Option<String>,
    /// Whole-request timeout in seconds
    pub timeout_secs: u64,
    /// Gemini only
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Endpoint override
    #[serde(default)]
    pub api_base: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl ProviderConfig {
    pub fn gemini() -> Self {
        Self {
            provider: gemini::PROVIDER_NAME.to_string(),
            model: Some(gemini::DEFAULT_MODEL.to_string()),
            ..Default::default()
        }
    }

    pub fn ollama() -> Self {
        Self {
            provider: ollama::PROVIDER_NAME.to_string(),
            model: Some(ollama::DEFAULT_MODEL.to_string()),
            api_base: Some(ollama::DEFAULT_API_BASE.to_string()),
            ..Default::default()
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider: gemini::PROVIDER_NAME.to_string(),
            model: None,
            timeout_secs: crate::constants::network::DEFAULT_TIMEOUT_SECS,
            api_key: None,
            api_base: None,
        }
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// A backend that streams a completion for one prompt
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Start generating a completion for `prompt`
    ///
    /// The stream is lazy: no request leaves the process until it is polled.
    /// Failures surface as a single `Err` item after which the stream ends.
    fn generate<'a>(&'a self, prompt: &'a str, params: &'a GenerationParams) -> TokenStream<'a>;

    /// Provider name for logging and selection
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn kind(&self) -> ProviderKind;

    /// Cheap availability predicate checked before each attempt
    async fn is_available(&self) -> bool;
}

/// Build the backend named by `config.provider`
pub fn create_provider(config: &ProviderConfig) -> Result<SharedProvider> {
    match config.provider.as_str() {
        gemini::PROVIDER_NAME => Ok(Arc::new(GeminiProvider::new(config.clone())?)),
        ollama::PROVIDER_NAME => Ok(Arc::new(OllamaProvider::new(config.clone())?)),
        _ => Err(ExplainError::Config(format!(
            "Unknown provider: {}. Supported: gemini, ollama",
            config.provider
        ))),
    }
}
