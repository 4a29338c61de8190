//! Code Explanation Orchestrator
//!
//! Drives one request through the pipeline:
//!
//! ```text
//! LengthCheck ─► CacheLookup ─► Validating ─► Generating ─► Finalizing ─► Done
//!      │              │              │             │
//!      ▼              ▼              ▼             ▼
//!   Rejected     Done (hit)      Rejected        Failed
//! ```
//!
//! A cache hit never reaches the validator. Results are written to the cache
//! only after a provider completed its stream.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::ai::metrics::MetricsCollector;
use crate::ai::preflight::CodeValidator;
use crate::ai::prompt::PromptTemplates;
use crate::ai::provider::{
    GenerationParams, ProviderChain, ProviderDescriptor, SharedProvider, create_provider,
};
use crate::config::Config;
use crate::storage::ResultCache;
use crate::types::{
    ExplainOutcome, ExplanationRequest, ExplanationResult, Fingerprint, PerformanceMetrics,
    Rejection, Result,
};

/// Explains source code with validation, failover and caching
pub struct CodeExplainer {
    chain: ProviderChain,
    validator: CodeValidator,
    validation_enabled: bool,
    cache: Option<ResultCache>,
    default_params: GenerationParams,
}

impl CodeExplainer {
    pub fn new(chain: ProviderChain, validator: CodeValidator, cache: Option<ResultCache>) -> Self {
        Self {
            chain,
            validator,
            validation_enabled: true,
            cache,
            default_params: GenerationParams::default(),
        }
    }

    /// Parameters for requests that carry none
    pub fn with_default_params(mut self, params: GenerationParams) -> Self {
        self.default_params = params;
        self
    }

    /// Skip the model-based check; length bounds still apply
    pub fn without_validation(mut self) -> Self {
        self.validation_enabled = false;
        self
    }

    /// Wire providers, validator and cache from configuration.
    ///
    /// Each configured provider is built once and shared between the
    /// generation chain and the validator.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut built: HashMap<String, SharedProvider> = HashMap::new();
        let mut shared = |name: &str| -> Result<Option<SharedProvider>> {
            if let Some(provider) = built.get(name) {
                return Ok(Some(provider.clone()));
            }
            let Some(provider_config) = config.llm.provider(name) else {
                return Ok(None);
            };
            let provider = create_provider(provider_config)?;
            built.insert(name.to_string(), provider.clone());
            Ok(Some(provider))
        };

        let mut chain = ProviderChain::new(config.chain_config());
        for name in &config.llm.default_order {
            if let Some(provider) = shared(name)? {
                chain = chain.add_provider(provider);
            }
        }

        let mut validator_providers = Vec::new();
        for name in &config.validation.order {
            if let Some(provider) = shared(name)? {
                validator_providers.push(provider);
            }
        }
        let validator = CodeValidator::new(validator_providers, config.validator_settings());

        let cache = config
            .cache
            .enabled
            .then(|| ResultCache::from_config(&config.cache));

        let mut explainer =
            Self::new(chain, validator, cache).with_default_params(config.generation_params());
        if !config.validation.enabled {
            explainer = explainer.without_validation();
        }

        debug!(
            providers = ?config.llm.default_order,
            validators = ?config.validation.order,
            cache = config.cache.enabled,
            "Code explainer configured"
        );

        Ok(explainer)
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Explain without observing the stream
    pub async fn explain(&self, request: &ExplanationRequest) -> ExplainOutcome {
        self.explain_streaming(request, |_| {}).await
    }

    /// Explain, handing every chunk of text to `sink` as it arrives.
    ///
    /// On a cache hit the whole cached explanation is passed to `sink` once.
    #[instrument(
        skip_all,
        fields(request_id = %request.request_id(), language = %request.language())
    )]
    pub async fn explain_streaming<F>(&self, request: &ExplanationRequest, mut sink: F) -> ExplainOutcome
    where
        F: FnMut(&str) + Send,
    {
        let source = request.source();

        if let Some(rejection) = self.validator.check_length(source) {
            info!(reason = %rejection, "Input out of bounds");
            return ExplainOutcome::Rejected(rejection);
        }

        let fingerprint = Fingerprint::compute(source, request.language());
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get(&fingerprint).await
        {
            info!(fingerprint = %fingerprint, provider = %cached.provider, "Serving cached explanation");
            sink(&cached.explanation);
            let metrics = PerformanceMetrics::cached_from(&cached.metrics);
            return ExplainOutcome::Done(ExplanationResult { metrics, ..cached });
        }

        if self.validation_enabled {
            let verdict = self.validator.validate(source).await;
            if !verdict.is_valid {
                info!(reason = %verdict.reason, confidence = verdict.confidence, "Input rejected by validator");
                return ExplainOutcome::Rejected(Rejection::ValidationRejected {
                    reason: verdict.reason,
                    confidence: verdict.confidence,
                });
            }
        }

        let params = request.params().copied().unwrap_or(self.default_params);
        let prompt = PromptTemplates::code_explanation(request.language(), source);

        // Timing covers generation only, not validation or the cache lookup
        let mut metrics = MetricsCollector::start();
        let (result, stats) = self
            .chain
            .generate_with_failover(&prompt, &params, request.provider(), &mut metrics, &mut sink)
            .await;

        let generation = match result {
            Ok(generation) => generation,
            Err(failures) => {
                warn!(
                    attempts = stats.attempts.len(),
                    skipped = stats.providers_skipped_unavailable,
                    elapsed_ms = stats.total_duration_ms,
                    "All providers failed"
                );
                return ExplainOutcome::Failed(failures);
            }
        };

        debug!(
            attempts = stats.total_attempts,
            chain_ms = stats.total_duration_ms,
            "Generation finished"
        );

        let metrics = metrics.finish();
        let result = ExplanationResult {
            explanation: generation.text.trim().to_string(),
            provider: generation.provider,
            model: generation.model,
            created_at: Utc::now(),
            metrics,
        };

        info!(
            provider = %result.provider,
            model = %result.model,
            ttft_ms = result.metrics.time_to_first_token_ms,
            total_ms = result.metrics.total_time_ms,
            tokens = result.metrics.tokens_decoded,
            "Explanation complete"
        );

        if let Some(cache) = &self.cache
            && let Err(e) = cache.put(&fingerprint, request.language(), &result).await
        {
            debug!(error = %e, "Continuing without cache write");
        }

        ExplainOutcome::Done(result)
    }

    /// Names of providers that are currently usable, in failover order
    pub async fn list_available_providers(&self) -> Vec<String> {
        self.chain.available_names().await
    }

    /// Every configured provider with its model and availability
    pub async fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.chain.descriptors().await
    }
}
