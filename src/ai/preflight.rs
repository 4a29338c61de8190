//! Pre-flight Code Validation
//!
//! Screens input before the expensive explanation call.
//!
//! ## Checks
//!
//! - Length bounds (no model call)
//! - A cheap model call classifying a bounded sample as code or not
//!
//! ## Design
//!
//! Validator providers are tried in their own order (local first by
//! default). A parse failure is a negative verdict. If every provider fails
//! at the provider level the verdict is permissive so an outage never blocks
//! explanations.

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::ai::prompt::PromptTemplates;
use crate::ai::provider::{GenerationParams, LlmProvider, SharedProvider};
use crate::ai::timeout::with_timeout;
use crate::ai::validation::parse_verdict;
use crate::constants::validation as val_constants;
use crate::types::{ErrorClassifier, ExplainError, ProviderError, Rejection, ValidationResult};

/// Tunables for the validator
#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    /// Minimum trimmed length, in characters
    pub min_code_length: usize,
    /// Maximum length, in characters
    pub max_code_length: usize,
    /// Characters of source shown to the model
    pub sample_size: usize,
    pub params: GenerationParams,
    /// Upper bound on one provider round trip
    pub timeout: Duration,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            min_code_length: val_constants::MIN_CODE_LENGTH,
            max_code_length: val_constants::MAX_CODE_LENGTH,
            sample_size: val_constants::SAMPLE_SIZE,
            params: GenerationParams::new(val_constants::TEMPERATURE, val_constants::MAX_TOKENS),
            timeout: Duration::from_secs(val_constants::TIMEOUT_SECS),
        }
    }
}

/// Pre-flight validator
pub struct CodeValidator {
    providers: Vec<SharedProvider>,
    settings: ValidatorSettings,
}

impl CodeValidator {
    /// `providers` are consulted in the given order
    pub fn new(providers: Vec<SharedProvider>, settings: ValidatorSettings) -> Self {
        Self {
            providers,
            settings,
        }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    /// Length short-circuit; `Some` holds the rejection when out of bounds
    pub fn check_length(&self, source: &str) -> Option<Rejection> {
        let trimmed = source.trim().chars().count();
        if trimmed < self.settings.min_code_length {
            return Some(Rejection::InputOutOfBounds {
                length: trimmed,
                reason: format!(
                    "Code is too short (minimum {} characters)",
                    self.settings.min_code_length
                ),
            });
        }

        let length = source.chars().count();
        if length > self.settings.max_code_length {
            return Some(Rejection::InputOutOfBounds {
                length,
                reason: format!(
                    "Code is too large (maximum {} characters)",
                    self.settings.max_code_length
                ),
            });
        }

        None
    }

    /// Leading slice of `source` shown to the validator model
    pub fn sample(&self, source: &str) -> String {
        let mut chars = source.chars();
        let mut sample: String = chars.by_ref().take(self.settings.sample_size).collect();
        if chars.next().is_some() {
            sample.push_str(val_constants::TRUNCATION_MARKER);
        }
        sample
    }

    /// Judge whether `source` is plausibly code
    #[instrument(skip_all, fields(chars = source.len()))]
    pub async fn validate(&self, source: &str) -> ValidationResult {
        if let Some(rejection) = self.check_length(source) {
            return ValidationResult::invalid(rejection.reason(), 1.0);
        }

        let prompt = PromptTemplates::code_validation(&self.sample(source));
        let mut failures: Vec<ProviderError> = Vec::new();

        for provider in &self.providers {
            let name = provider.name();

            if !provider.is_available().await {
                debug!(provider = %name, "Validator provider unavailable, skipping");
                failures.push(ProviderError::unavailable(
                    format!("{} is not available", name),
                    name,
                ));
                continue;
            }

            let reply = with_timeout(
                self.settings.timeout,
                async {
                    collect_text(provider.as_ref(), &prompt, &self.settings.params)
                        .await
                        .map_err(ExplainError::Provider)
                },
                "code validation",
            )
            .await;

            match reply {
                Ok(text) => {
                    let verdict = parse_verdict(&text);
                    info!(
                        provider = %name,
                        is_valid = verdict.is_valid,
                        confidence = verdict.confidence,
                        "Validation verdict"
                    );
                    return verdict;
                }
                Err(e) => {
                    let failure = ErrorClassifier::classify_explain_error(&e, name);
                    warn!(provider = %name, kind = %failure.kind, "Validator provider failed");
                    failures.push(failure);
                }
            }
        }

        let reason = format!(
            "Validation check skipped due to errors: {}",
            if failures.is_empty() {
                "no validator providers configured".to_string()
            } else {
                failures
                    .iter()
                    .map(|f| {
                        format!(
                            "{}: {}",
                            f.provider.as_deref().unwrap_or("unknown"),
                            f.message
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("; ")
            }
        );
        warn!(reason = %reason, "All validator providers failed, allowing input");
        ValidationResult::valid(reason, val_constants::PERMISSIVE_CONFIDENCE)
    }
}

/// Drain a provider stream into one string
async fn collect_text(
    provider: &dyn LlmProvider,
    prompt: &str,
    params: &GenerationParams,
) -> std::result::Result<String, ProviderError> {
    let mut stream = provider.generate(prompt, params);
    let mut text = String::new();
    while let Some(item) = stream.next().await {
        text.push_str(&item?.text);
    }
    if text.trim().is_empty() {
        return Err(ProviderError::malformed(
            "validator returned an empty response",
            provider.name(),
        ));
    }
    Ok(text)
}
