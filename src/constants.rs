//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Explanation generation defaults
pub mod generation {
    /// Sampling temperature for explanations
    pub const EXPLANATION_TEMPERATURE: f32 = 0.7;

    /// Token ceiling for explanations
    pub const EXPLANATION_MAX_TOKENS: u32 = 8192;
}

/// Pre-flight validation constants
pub mod validation {
    /// Minimum trimmed source length (characters)
    pub const MIN_CODE_LENGTH: usize = 10;

    /// Maximum source length (characters)
    pub const MAX_CODE_LENGTH: usize = 100_000;

    /// Characters of source sent to the validator model
    pub const SAMPLE_SIZE: usize = 1000;

    /// Marker appended to a truncated validation sample
    pub const TRUNCATION_MARKER: &str = "\n... (truncated)";

    /// Low temperature keeps verdicts stable
    pub const TEMPERATURE: f32 = 0.3;

    /// The verdict is a short JSON object
    pub const MAX_TOKENS: u32 = 512;

    /// Confidence of a verdict issued when every validator provider failed
    pub const PERMISSIVE_CONFIDENCE: f32 = 0.5;

    /// Upper bound on one validator round trip (seconds)
    pub const TIMEOUT_SECS: u64 = 60;
}

/// Result cache constants
pub mod cache {
    /// Default cache directory, relative to the working directory
    pub const DEFAULT_DIR: &str = ".cache";

    /// Record lifetime (7 days)
    pub const DEFAULT_TTL_SECS: u64 = 604_800;

    /// Extension of a cache record
    pub const RECORD_EXTENSION: &str = "json";

    /// Prefix of in-flight temp files
    pub const TEMP_PREFIX: &str = ".tmp-";
}

/// HTTP/Network constants
pub mod network {
    /// Default whole-request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;

    /// Maximum wait for the first streamed chunk (seconds)
    pub const FIRST_CHUNK_TIMEOUT_SECS: u64 = 120;

    /// Ollama availability probe timeout (seconds)
    pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

    /// Longest error body excerpt kept in a provider error message
    pub const MAX_ERROR_BODY_CHARS: usize = 300;
}
