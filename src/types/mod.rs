pub mod error;
pub mod explanation;

pub use error::{ErrorClassifier, ExplainError, FailureKind, ProviderError, Result};
pub use explanation::{
    ExplainOutcome, ExplanationRequest, ExplanationResult, PerformanceMetrics, Rejection,
    ValidationResult,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use sha2::{Digest, Sha256};
use std::fmt;

/// Content-addressed cache key
///
/// Derived from the declared language and the exact source bytes only. The
/// provider that would serve the request never participates, so every backend
/// shares one cache slot per (source, language) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a source text and language label
    ///
    /// The language label is trimmed and lowercased; the source is hashed
    /// byte for byte, whitespace included.
    pub fn compute(source: &str, language: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(language.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(source.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
