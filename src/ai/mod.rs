//! AI Integration Layer
//!
//! Provides LLM integration for code explanation: streaming providers with
//! failover, pre-flight validation, prompts and per-request metrics.

pub mod metrics;
pub mod preflight;
pub mod prompt;
pub mod provider;
pub mod timeout;
pub mod validation;

pub use metrics::{MetricsCollector, tokens_per_second};
pub use preflight::{CodeValidator, ValidatorSettings};
pub use prompt::{PromptBuilder, PromptTemplates};
pub use provider::{
    ChainConfig, ChainStats, ChainedProvider, GeminiProvider, GenerationParams, LlmProvider,
    OllamaProvider, ProviderChain, ProviderConfig, ProviderDescriptor,
    ProviderKind, SharedProvider, TokenChunk, TokenStream, TokenUsage, create_provider,
};
pub use timeout::{with_timeout, with_timeout_map};
pub use validation::{JsonRepairer, extract_json_from_response, parse_verdict};
