//! codexplain - LLM-Backed Source Code Explainer
//!
//! Explains source files with a streaming LLM, guarded by a cheap pre-flight
//! validation call and backed by a content-addressed result cache.
//!
//! ## Core Features
//!
//! - **Provider Failover**: Gemini (cloud) and Ollama (local) behind one trait
//! - **Pre-flight Validation**: Rejects non-code before the expensive call
//! - **Result Cache**: TTL-bounded JSON records keyed by language and source
//! - **Streaming Metrics**: Time to first token, throughput and token counts
//!
//! ## Quick Start
//!
//! ```ignore
//! use codexplain::{CodeExplainer, ConfigLoader, ExplanationRequest};
//!
//! let config = ConfigLoader::load()?;
//! let explainer = CodeExplainer::from_config(&config)?;
//! let request = ExplanationRequest::new(source, "Python");
//! let result = explainer
//!     .explain_streaming(&request, |text| print!("{}", text))
//!     .await
//!     .into_result()?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: Providers, failover chain, validator, prompts, metrics
//! - [`explainer`]: Request orchestration
//! - [`storage`]: File-backed result cache
//! - [`config`]: Layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod explainer;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorClassifier, ExplainError, FailureKind, ProviderError, Result};

// Data Model
pub use types::{
    ExplainOutcome, ExplanationRequest, ExplanationResult, Fingerprint, PerformanceMetrics,
    Rejection, ValidationResult,
};

// Orchestration & Storage
pub use explainer::CodeExplainer;
pub use storage::{CacheStats, ResultCache};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    CodeValidator, GeminiProvider, GenerationParams, LlmProvider, MetricsCollector,
    OllamaProvider, ProviderChain, ProviderDescriptor, ProviderKind, create_provider,
    with_timeout,
};
