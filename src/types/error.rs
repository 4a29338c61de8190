//! Unified Error Type System
//!
//! Centralized error types for the explanation pipeline.
//! Provider failures are normalized into a closed set of kinds so the
//! orchestrator can match on them exhaustively when deciding failover.
//!
//! ## Failure Kinds
//!
//! - **Unavailable**: Credentials missing, service unreachable or timed out
//! - **RateLimited**: Quota or rate limit hit on the backend
//! - **ModelNotFound**: Configured model does not exist on the backend
//! - **MalformedResponse**: Backend returned non-text, corrupt or empty output
//!
//! Every kind moves the orchestrator to the next provider. None of them is
//! retried on the same provider.

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Failure Kinds
// =============================================================================

/// Normalized provider failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Credentials missing or service unreachable - permanent for this attempt
    Unavailable,
    /// Rate limited - transient, move to the next provider
    RateLimited,
    /// Model not found - configuration error
    ModelNotFound,
    /// Non-text, corrupt or empty response
    MalformedResponse,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "UNAVAILABLE"),
            Self::RateLimited => write!(f, "RATE_LIMITED"),
            Self::ModelNotFound => write!(f, "MODEL_NOT_FOUND"),
            Self::MalformedResponse => write!(f, "MALFORMED_RESPONSE"),
        }
    }
}

// =============================================================================
// Provider Error
// =============================================================================

/// A failure scoped to one provider attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderError {
    /// Failure kind for failover decisions
    pub kind: FailureKind,
    /// Detailed error message
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.kind, self.message)
        } else {
            write!(f, "[{}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
        }
    }

    pub fn with_provider(
        kind: FailureKind,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: Some(provider.into()),
        }
    }

    /// Add provider context to an existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn unavailable(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::with_provider(FailureKind::Unavailable, message, provider)
    }

    pub fn malformed(message: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::with_provider(FailureKind::MalformedResponse, message, provider)
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps raw backend failures onto [`FailureKind`]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an error message from any provider
    pub fn classify(message: &str, provider: &str) -> ProviderError {
        let lower = message.to_lowercase();

        if lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("quota")
            || lower.contains("resource_exhausted")
        {
            return ProviderError::with_provider(FailureKind::RateLimited, message, provider);
        }

        if lower.contains("model")
            && (lower.contains("not found") || lower.contains("pull") || lower.contains("invalid"))
            || lower.contains("404")
        {
            return ProviderError::with_provider(FailureKind::ModelNotFound, message, provider);
        }

        if lower.contains("connection")
            || lower.contains("refused")
            || lower.contains("unreachable")
            || lower.contains("dns")
            || lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("api key")
            || lower.contains("unauthorized")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("503")
            || lower.contains("service unavailable")
        {
            return ProviderError::with_provider(FailureKind::Unavailable, message, provider);
        }

        if lower.contains("parse")
            || lower.contains("json")
            || lower.contains("malformed")
            || lower.contains("empty response")
            || lower.contains("unexpected")
        {
            return ProviderError::with_provider(FailureKind::MalformedResponse, message, provider);
        }

        // Anything unrecognized came back from the backend but could not be used
        ProviderError::with_provider(FailureKind::MalformedResponse, message, provider)
    }

    /// Classify HTTP status code directly (more accurate than string matching)
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> ProviderError {
        match status {
            429 => ProviderError::with_provider(FailureKind::RateLimited, message, provider),
            404 => ProviderError::with_provider(FailureKind::ModelNotFound, message, provider),
            401 | 403 => ProviderError::with_provider(FailureKind::Unavailable, message, provider),
            500..=599 => ProviderError::with_provider(FailureKind::Unavailable, message, provider),
            _ => Self::classify(message, provider),
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> ProviderError {
        if err.is_connect() || err.is_timeout() {
            return ProviderError::with_provider(
                FailureKind::Unavailable,
                format!("{} request failed: {}", provider, err),
                provider,
            );
        }
        if err.is_decode() || err.is_body() {
            return ProviderError::with_provider(
                FailureKind::MalformedResponse,
                format!("{} stream could not be read: {}", provider, err),
                provider,
            );
        }
        if let Some(status) = err.status() {
            return Self::classify_http_status(status.as_u16(), &err.to_string(), provider);
        }
        Self::classify(&err.to_string(), provider)
    }

    /// Classify a pipeline error raised while talking to a provider
    pub fn classify_explain_error(err: &ExplainError, provider: &str) -> ProviderError {
        match err {
            ExplainError::Provider(inner) => inner.clone().provider(provider),
            ExplainError::Timeout { .. } | ExplainError::Io(_) => {
                ProviderError::with_provider(FailureKind::Unavailable, err.to_string(), provider)
            }
            ExplainError::Json(_) => {
                ProviderError::with_provider(FailureKind::MalformedResponse, err.to_string(), provider)
            }
            _ => Self::classify(&err.to_string(), provider),
        }
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ExplainError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Provider Errors
    // -------------------------------------------------------------------------
    /// Failure scoped to a single provider attempt
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Every provider in the attempt order failed
    #[error("All providers failed: {}", join_failures(.failures))]
    AllProvidersExhausted { failures: Vec<ProviderError> },

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Input rejected: {reason}")]
    InputOutOfBounds { length: usize, reason: String },

    #[error("Input validation failed: {reason}")]
    ValidationRejected { reason: String, confidence: f32 },

    // -------------------------------------------------------------------------
    // Cache Errors (never fatal to an explanation)
    // -------------------------------------------------------------------------
    #[error("Cache entry {fingerprint} unreadable: {reason}")]
    CacheReadCorruption { fingerprint: String, reason: String },

    #[error("Cache write for {fingerprint} failed: {reason}")]
    CacheWriteFailure { fingerprint: String, reason: String },
}

impl From<ProviderError> for ExplainError {
    fn from(err: ProviderError) -> Self {
        ExplainError::Provider(err)
    }
}

pub type Result<T> = std::result::Result<T, ExplainError>;

fn join_failures(failures: &[ProviderError]) -> String {
    if failures.is_empty() {
        return "no providers were attempted".to_string();
    }
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ExplainError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error ends an explanation instead of being absorbed
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::InputOutOfBounds { .. }
                | Self::ValidationRejected { .. }
                | Self::AllProvidersExhausted { .. }
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::RateLimited.to_string(), "RATE_LIMITED");
        assert_eq!(FailureKind::ModelNotFound.to_string(), "MODEL_NOT_FOUND");
        assert_eq!(FailureKind::Unavailable.to_string(), "UNAVAILABLE");
        assert_eq!(
            FailureKind::MalformedResponse.to_string(),
            "MALFORMED_RESPONSE"
        );
    }

    #[test]
    fn test_classify_rate_limit() {
        let err = ErrorClassifier::classify("Quota exceeded for this project", "gemini");
        assert_eq!(err.kind, FailureKind::RateLimited);
        assert_eq!(err.provider.as_deref(), Some("gemini"));
    }

    #[test]
    fn test_classify_model_not_found() {
        let err = ErrorClassifier::classify("model 'llama9' not found, try pulling it", "ollama");
        assert_eq!(err.kind, FailureKind::ModelNotFound);
    }

    #[test]
    fn test_classify_unreachable() {
        let err = ErrorClassifier::classify("Connection refused (os error 111)", "ollama");
        assert_eq!(err.kind, FailureKind::Unavailable);
    }

    #[test]
    fn test_classify_unknown_is_malformed() {
        let err = ErrorClassifier::classify("Something weird happened", "test");
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }

    #[test]
    fn test_classify_http_status() {
        let rate = ErrorClassifier::classify_http_status(429, "slow down", "gemini");
        assert_eq!(rate.kind, FailureKind::RateLimited);

        let missing = ErrorClassifier::classify_http_status(404, "no such model", "gemini");
        assert_eq!(missing.kind, FailureKind::ModelNotFound);

        let auth = ErrorClassifier::classify_http_status(403, "denied", "gemini");
        assert_eq!(auth.kind, FailureKind::Unavailable);

        let server = ErrorClassifier::classify_http_status(502, "bad gateway", "gemini");
        assert_eq!(server.kind, FailureKind::Unavailable);
    }

    #[test]
    fn test_classify_timeout_error() {
        let err = ExplainError::timeout("first token from ollama", Duration::from_secs(5));
        let classified = ErrorClassifier::classify_explain_error(&err, "ollama");
        assert_eq!(classified.kind, FailureKind::Unavailable);
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::with_provider(FailureKind::RateLimited, "Too many requests", "gemini");
        assert_eq!(err.to_string(), "[gemini:RATE_LIMITED] Too many requests");

        let bare = ProviderError::new(FailureKind::Unavailable, "no key");
        assert_eq!(bare.to_string(), "[UNAVAILABLE] no key");
    }

    #[test]
    fn test_exhausted_lists_every_failure() {
        let err = ExplainError::AllProvidersExhausted {
            failures: vec![
                ProviderError::with_provider(FailureKind::RateLimited, "429", "gemini"),
                ProviderError::with_provider(FailureKind::Unavailable, "refused", "ollama"),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("gemini:RATE_LIMITED"));
        assert!(text.contains("ollama:UNAVAILABLE"));
        assert!(err.is_terminal());
    }
}
