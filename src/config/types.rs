//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/codexplain/) and project (.codexplain/) level configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::ai::preflight::ValidatorSettings;
use crate::ai::provider::{ChainConfig, GenerationParams, ProviderConfig};
use crate::constants::{
    cache as cache_constants, generation as gen_constants, network as net_constants,
    validation as val_constants,
};
use crate::types::{ExplainError, Result};

/// Names accepted in provider order lists
pub const KNOWN_PROVIDERS: &[&str] = &["gemini", "ollama"];

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// LLM provider settings
    pub llm: LlmConfig,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Pre-flight validation settings
    pub validation: ValidationConfig,

    /// Explanation sampling settings
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            validation: ValidationConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `ExplainError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        check_order("llm.default_order", &self.llm.default_order)?;
        check_order("validation.order", &self.validation.order)?;

        check_temperature("generation.temperature", self.generation.temperature)?;
        check_temperature("validation.temperature", self.validation.temperature)?;

        if self.generation.max_tokens == 0 || self.validation.max_tokens == 0 {
            return Err(ExplainError::Config(
                "max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.llm.gemini.timeout_secs == 0 || self.llm.ollama.timeout_secs == 0 {
            return Err(ExplainError::Config(
                "Provider timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.first_chunk_timeout_secs == 0 || self.validation.timeout_secs == 0 {
            return Err(ExplainError::Config(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.validation.min_code_length > self.validation.max_code_length {
            return Err(ExplainError::Config(format!(
                "validation.min_code_length ({}) exceeds validation.max_code_length ({})",
                self.validation.min_code_length, self.validation.max_code_length
            )));
        }

        if self.validation.sample_size == 0 {
            return Err(ExplainError::Config(
                "validation.sample_size must be greater than 0".to_string(),
            ));
        }

        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ExplainError::Config(
                "cache.ttl_secs must be greater than 0 when the cache is enabled".to_string(),
            ));
        }

        Ok(())
    }

    /// Parameters used for explanation requests that carry none
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams::new(self.generation.temperature, self.generation.max_tokens)
    }

    pub fn validator_settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            min_code_length: self.validation.min_code_length,
            max_code_length: self.validation.max_code_length,
            sample_size: self.validation.sample_size,
            params: GenerationParams::new(self.validation.temperature, self.validation.max_tokens),
            timeout: Duration::from_secs(self.validation.timeout_secs),
        }
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            first_chunk_timeout: Duration::from_secs(self.llm.first_chunk_timeout_secs),
        }
    }
}

fn check_order(field: &str, order: &[String]) -> Result<()> {
    if order.is_empty() {
        return Err(ExplainError::Config(format!("{} must not be empty", field)));
    }
    for name in order {
        if !KNOWN_PROVIDERS.contains(&name.as_str()) {
            return Err(ExplainError::Config(format!(
                "Unknown provider '{}' in {}. Supported: {}",
                name,
                field,
                KNOWN_PROVIDERS.join(", ")
            )));
        }
    }
    Ok(())
}

fn check_temperature(field: &str, value: f32) -> Result<()> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ExplainError::Config(format!(
            "{} must be between 0.0 and 2.0, got {}",
            field, value
        )));
    }
    Ok(())
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Failover order for explanations (cloud first by default)
    pub default_order: Vec<String>,

    /// Maximum wait for the first streamed chunk of an attempt
    pub first_chunk_timeout_secs: u64,

    pub gemini: ProviderConfig,

    pub ollama: ProviderConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_order: vec!["gemini".to_string(), "ollama".to_string()],
            first_chunk_timeout_secs: net_constants::FIRST_CHUNK_TIMEOUT_SECS,
            gemini: ProviderConfig::gemini(),
            ollama: ProviderConfig::ollama(),
        }
    }
}

impl LlmConfig {
    /// Settings for the named provider
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "gemini" => Some(&self.gemini),
            "ollama" => Some(&self.ollama),
            _ => None,
        }
    }

    /// Provider settings in the given order, skipping unknown names
    pub fn providers_in(&self, order: &[String]) -> Vec<ProviderConfig> {
        order
            .iter()
            .filter_map(|name| self.provider(name))
            .cloned()
            .collect()
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Directory holding one JSON record per fingerprint
    pub dir: PathBuf,

    /// Record lifetime in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(cache_constants::DEFAULT_DIR),
            ttl_secs: cache_constants::DEFAULT_TTL_SECS,
        }
    }
}

// =============================================================================
// Validation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Run the model-based check (length bounds always apply)
    pub enabled: bool,
    pub min_code_length: usize,
    pub max_code_length: usize,
    pub sample_size: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Validator provider order (local first by default)
    pub order: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_code_length: val_constants::MIN_CODE_LENGTH,
            max_code_length: val_constants::MAX_CODE_LENGTH,
            sample_size: val_constants::SAMPLE_SIZE,
            temperature: val_constants::TEMPERATURE,
            max_tokens: val_constants::MAX_TOKENS,
            timeout_secs: val_constants::TIMEOUT_SECS,
            order: vec!["ollama".to_string(), "gemini".to_string()],
        }
    }
}

// =============================================================================
// Generation Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: gen_constants::EXPLANATION_TEMPERATURE,
            max_tokens: gen_constants::EXPLANATION_MAX_TOKENS,
        }
    }
}
