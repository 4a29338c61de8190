//! Explanation Pipeline Data Model
//!
//! Requests flowing into the orchestrator and the results, verdicts and
//! outcomes flowing back out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ai::provider::GenerationParams;
use crate::types::error::{ExplainError, ProviderError};

// =============================================================================
// Request
// =============================================================================

/// A single file submitted for explanation
///
/// Built once by the caller and never mutated by the pipeline.
#[derive(Debug, Clone)]
pub struct ExplanationRequest {
    request_id: Uuid,
    source: String,
    language: String,
    provider: Option<String>,
    params: Option<GenerationParams>,
}

impl ExplanationRequest {
    pub fn new(source: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            source: source.into(),
            language: language.into(),
            provider: None,
            params: None,
        }
    }

    /// Pin the request to a single provider (disables failover)
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Override the configured explanation generation parameters
    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn params(&self) -> Option<&GenerationParams> {
        self.params.as_ref()
    }
}

// =============================================================================
// Validation Verdict
// =============================================================================

fn default_confidence() -> f32 {
    0.8
}

/// Verdict on whether submitted text is plausibly source code
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the code is valid and safe to explain
    pub is_valid: bool,
    /// Why the code is valid or invalid
    pub reason: String,
    /// Confidence score between 0 and 1
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

impl ValidationResult {
    pub fn valid(reason: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_valid: true,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn invalid(reason: impl Into<String>, confidence: f32) -> Self {
        Self {
            is_valid: false,
            reason: reason.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

// =============================================================================
// Result & Metrics
// =============================================================================

/// Timing and token counters for one explanation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Request start to first non-empty chunk (prefill latency)
    pub time_to_first_token_ms: u64,
    /// Request start to stream completion
    pub total_time_ms: u64,
    /// Output tokens decoded
    pub tokens_decoded: u64,
    /// Prompt tokens, when the backend reports them
    pub input_tokens: u64,
    /// Decode speed; `None` when decode time rounds to zero
    pub tokens_per_second: Option<f64>,
    /// Served from the result cache
    pub cache_hit: bool,
}

impl PerformanceMetrics {
    /// Metrics reported for a cache hit: instant, with the original token counts
    pub fn cached_from(original: &PerformanceMetrics) -> Self {
        Self {
            time_to_first_token_ms: 0,
            total_time_ms: 0,
            tokens_decoded: original.tokens_decoded,
            input_tokens: original.input_tokens,
            tokens_per_second: None,
            cache_hit: true,
        }
    }
}

/// A generated explanation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationResult {
    pub explanation: String,
    /// Provider that produced the explanation
    pub provider: String,
    /// Model used by that provider
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub metrics: PerformanceMetrics,
}

// =============================================================================
// Outcome
// =============================================================================

/// Why a request was turned away before generation
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Too short or too long; no provider was called
    InputOutOfBounds { length: usize, reason: String },
    /// The validator judged the input not to be code
    ValidationRejected { reason: String, confidence: f32 },
}

impl Rejection {
    pub fn reason(&self) -> &str {
        match self {
            Self::InputOutOfBounds { reason, .. } | Self::ValidationRejected { reason, .. } => {
                reason
            }
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Terminal state of one `explain` call
#[derive(Debug, Clone)]
pub enum ExplainOutcome {
    Done(ExplanationResult),
    Rejected(Rejection),
    /// Every attempted provider failed; one entry per attempt, in order
    Failed(Vec<ProviderError>),
}

impl ExplainOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done(_))
    }

    pub fn result(&self) -> Option<&ExplanationResult> {
        match self {
            Self::Done(result) => Some(result),
            _ => None,
        }
    }

    /// Convert into a `Result` for callers that propagate with `?`
    pub fn into_result(self) -> crate::types::Result<ExplanationResult> {
        match self {
            Self::Done(result) => Ok(result),
            Self::Rejected(Rejection::InputOutOfBounds { length, reason }) => {
                Err(ExplainError::InputOutOfBounds { length, reason })
            }
            Self::Rejected(Rejection::ValidationRejected { reason, confidence }) => {
                Err(ExplainError::ValidationRejected { reason, confidence })
            }
            Self::Failed(failures) => Err(ExplainError::AllProvidersExhausted { failures }),
        }
    }
}
