//! Ranked Provider Chain with Ordered Failover
//!
//! Cascading streaming attempts across configured providers.
//!
//! ## Strategy
//!
//! 1. Resolve the attempt order (explicit override alone, else rank order)
//! 2. Skip a provider whose availability predicate is false
//! 3. Stream chunks to the caller while counting them into the metrics
//! 4. On any failure kind, record it and move to the next provider
//! 5. Continue until one provider completes or all are exhausted
//!
//! A provider is attempted at most once per request. There is no retry and no
//! backoff; a failed attempt may already have forwarded partial text.

use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use super::{GenerationParams, LlmProvider, ProviderDescriptor, SharedProvider};
use crate::ai::metrics::MetricsCollector;
use crate::ai::timeout::with_timeout_map;
use crate::constants::network as net_constants;
use crate::types::{ErrorClassifier, FailureKind, ProviderError};

/// Provider with its position in the default attempt order
#[derive(Clone)]
pub struct ChainedProvider {
    /// Provider instance
    pub provider: SharedProvider,
    /// Rank (lower = try first)
    pub rank: usize,
}

impl ChainedProvider {
    pub fn new(provider: SharedProvider, rank: usize) -> Self {
        Self { provider, rank }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }
}

/// Configuration for the provider chain
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Maximum wait for the first streamed item of an attempt
    pub first_chunk_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            first_chunk_timeout: Duration::from_secs(net_constants::FIRST_CHUNK_TIMEOUT_SECS),
        }
    }
}

/// Outcome of one provider attempt
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub provider_name: String,
    pub success: bool,
    pub error: Option<ProviderError>,
    /// Non-empty chunks forwarded before completion or failure
    pub chunks_forwarded: usize,
    pub duration_ms: u64,
}

/// Execution statistics for the chain
#[derive(Debug, Default)]
pub struct ChainStats {
    pub total_attempts: usize,
    pub attempts: Vec<AttemptRecord>,
    pub total_duration_ms: u64,
    pub providers_skipped_unavailable: usize,
}

impl ChainStats {
    /// Failures in attempt order
    pub fn failures(&self) -> Vec<ProviderError> {
        self.attempts.iter().filter_map(|a| a.error.clone()).collect()
    }
}

/// Text produced by the provider that completed the stream
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// Ordered failover chain over streaming providers
pub struct ProviderChain {
    providers: Vec<ChainedProvider>,
    config: ChainConfig,
}

impl ProviderChain {
    /// Create a new, empty provider chain
    pub fn new(config: ChainConfig) -> Self {
        Self {
            providers: Vec::new(),
            config,
        }
    }

    /// Add a provider to the end of the chain
    pub fn add_provider(mut self, provider: SharedProvider) -> Self {
        let rank = self.providers.len();
        self.providers.push(ChainedProvider::new(provider, rank));
        self
    }

    pub fn providers(&self) -> &[ChainedProvider] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Look up a provider by name
    pub fn find(&self, name: &str) -> Option<&ChainedProvider> {
        self.providers.iter().find(|p| p.name() == name)
    }

    /// Providers to attempt, in order
    ///
    /// With an override only that provider is returned (empty if unknown);
    /// otherwise every provider by rank.
    pub fn attempt_order(&self, provider_override: Option<&str>) -> Vec<&ChainedProvider> {
        match provider_override {
            Some(name) => self.find(name).into_iter().collect(),
            None => {
                let mut ordered: Vec<&ChainedProvider> = self.providers.iter().collect();
                ordered.sort_by_key(|p| p.rank);
                ordered
            }
        }
    }

    /// Snapshot every provider with its current availability
    pub async fn descriptors(&self) -> Vec<ProviderDescriptor> {
        let mut descriptors = Vec::with_capacity(self.providers.len());
        for entry in self.attempt_order(None) {
            descriptors.push(ProviderDescriptor {
                name: entry.name().to_string(),
                model: entry.provider.model().to_string(),
                kind: entry.provider.kind(),
                rank: entry.rank,
                available: entry.provider.is_available().await,
            });
        }
        descriptors
    }

    /// Names of the providers whose availability predicate holds, in rank order
    pub async fn available_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for entry in self.attempt_order(None) {
            if entry.provider.is_available().await {
                names.push(entry.name().to_string());
            }
        }
        names
    }

    /// Stream a completion, failing over across providers
    ///
    /// Every non-empty chunk is handed to `on_chunk` as it arrives and
    /// observed by `metrics`. On exhaustion the per-provider failures are
    /// returned in attempt order.
    #[instrument(skip_all, fields(providers = self.providers.len(), provider_override = ?provider_override))]
    pub async fn generate_with_failover(
        &self,
        prompt: &str,
        params: &GenerationParams,
        provider_override: Option<&str>,
        metrics: &mut MetricsCollector,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> (std::result::Result<Generation, Vec<ProviderError>>, ChainStats) {
        let mut stats = ChainStats::default();
        let start_time = Instant::now();

        let order = self.attempt_order(provider_override);
        if order.is_empty() {
            let error = match provider_override {
                Some(name) => ProviderError::unavailable(
                    format!("Unknown provider '{}'", name),
                    name,
                ),
                None => ProviderError::new(
                    FailureKind::Unavailable,
                    "No providers configured in chain",
                ),
            };
            warn!(error = %error, "No provider to attempt");
            stats.attempts.push(AttemptRecord {
                provider_name: error.provider.clone().unwrap_or_default(),
                success: false,
                error: Some(error),
                chunks_forwarded: 0,
                duration_ms: 0,
            });
            return (Err(stats.failures()), stats);
        }

        for entry in order {
            let provider = &entry.provider;
            let provider_name = provider.name().to_string();
            let attempt_start = Instant::now();

            if !provider.is_available().await {
                debug!(provider = %provider_name, "Skipping provider (unavailable)");
                stats.providers_skipped_unavailable += 1;
                stats.attempts.push(AttemptRecord {
                    provider_name: provider_name.clone(),
                    success: false,
                    error: Some(ProviderError::unavailable(
                        format!("{} is not available", provider_name),
                        provider_name.clone(),
                    )),
                    chunks_forwarded: 0,
                    duration_ms: 0,
                });
                continue;
            }

            stats.total_attempts += 1;
            debug!(
                total_attempt = stats.total_attempts,
                provider = %provider_name,
                model = %provider.model(),
                "Chain attempt"
            );

            let (result, chunks_forwarded) = self
                .stream_attempt(provider.as_ref(), prompt, params, metrics, on_chunk)
                .await;
            let duration_ms = attempt_start.elapsed().as_millis() as u64;

            match result {
                Ok(text) => {
                    stats.attempts.push(AttemptRecord {
                        provider_name: provider_name.clone(),
                        success: true,
                        error: None,
                        chunks_forwarded,
                        duration_ms,
                    });
                    stats.total_duration_ms = start_time.elapsed().as_millis() as u64;

                    info!(
                        provider = %provider_name,
                        attempts = stats.total_attempts,
                        "Chain succeeded"
                    );

                    let generation = Generation {
                        text,
                        provider: provider_name,
                        model: provider.model().to_string(),
                    };
                    return (Ok(generation), stats);
                }
                Err(error) => {
                    warn!(
                        provider = %provider_name,
                        kind = %error.kind,
                        chunks_forwarded,
                        error = %error.message,
                        "Provider failed, trying next"
                    );
                    stats.attempts.push(AttemptRecord {
                        provider_name,
                        success: false,
                        error: Some(error),
                        chunks_forwarded,
                        duration_ms,
                    });
                }
            }
        }

        stats.total_duration_ms = start_time.elapsed().as_millis() as u64;
        (Err(stats.failures()), stats)
    }

    /// Drive one provider's stream to completion
    async fn stream_attempt(
        &self,
        provider: &dyn LlmProvider,
        prompt: &str,
        params: &GenerationParams,
        metrics: &mut MetricsCollector,
        on_chunk: &mut (dyn FnMut(&str) + Send),
    ) -> (std::result::Result<String, ProviderError>, usize) {
        let name = provider.name();
        metrics.begin_attempt();

        let mut stream = provider.generate(prompt, params);
        let mut text = String::new();
        let mut forwarded = 0usize;

        loop {
            let item = if metrics.has_first_token() {
                stream.next().await
            } else {
                match with_timeout_map(self.config.first_chunk_timeout, stream.next(), "first chunk")
                    .await
                {
                    Ok(item) => item,
                    Err(e) => {
                        return (Err(ErrorClassifier::classify_explain_error(&e, name)), forwarded);
                    }
                }
            };

            match item {
                None => break,
                Some(Ok(chunk)) => {
                    metrics.observe(&chunk);
                    if !chunk.text.is_empty() {
                        on_chunk(&chunk.text);
                        text.push_str(&chunk.text);
                        forwarded += 1;
                    }
                }
                Some(Err(error)) => {
                    let error = if error.provider.is_some() {
                        error
                    } else {
                        error.provider(name)
                    };
                    return (Err(error), forwarded);
                }
            }
        }

        if text.trim().is_empty() {
            return (
                Err(ProviderError::malformed(
                    format!("{} returned an empty response", name),
                    name,
                )),
                forwarded,
            );
        }

        (Ok(text), forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::ai::provider::ProviderKind;
    use crate::ai::provider::scripted::ScriptedProvider;

    /// Collects providers for a chain; rank follows insertion order
    struct ProviderChainBuilder {
        providers: Vec<SharedProvider>,
        config: ChainConfig,
    }

    impl ProviderChainBuilder {
        fn new() -> Self {
            Self {
                providers: Vec::new(),
                config: ChainConfig::default(),
            }
        }

        fn add_provider(mut self, provider: impl LlmProvider + 'static) -> Self {
            self.providers.push(Arc::new(provider));
            self
        }

        fn add_shared(mut self, provider: SharedProvider) -> Self {
            self.providers.push(provider);
            self
        }

        fn with_config(mut self, config: ChainConfig) -> Self {
            self.config = config;
            self
        }

        fn build(self) -> ProviderChain {
            self.providers
                .into_iter()
                .fold(ProviderChain::new(self.config), |chain, provider| {
                    chain.add_provider(provider)
                })
        }
    }

    async fn run(
        chain: &ProviderChain,
        provider_override: Option<&str>,
    ) -> (
        std::result::Result<Generation, Vec<ProviderError>>,
        ChainStats,
        String,
    ) {
        let mut metrics = MetricsCollector::start();
        let mut streamed = String::new();
        let params = GenerationParams::default();
        let (result, stats) = chain
            .generate_with_failover(
                "Explain",
                &params,
                provider_override,
                &mut metrics,
                &mut |text: &str| streamed.push_str(text),
            )
            .await;
        (result, stats, streamed)
    }

    #[tokio::test]
    async fn test_chain_success_first_provider() {
        let chain = ProviderChainBuilder::new()
            .add_provider(ScriptedProvider::new("primary").replying(&["Adds ", "two numbers."]))
            .add_provider(ScriptedProvider::new("fallback"))
            .build();

        let (result, stats, streamed) = run(&chain, None).await;
        let generation = result.unwrap();
        assert_eq!(generation.provider, "primary");
        assert_eq!(generation.text, "Adds two numbers.");
        assert_eq!(streamed, "Adds two numbers.");
        assert_eq!(stats.total_attempts, 1);
    }

    #[tokio::test]
    async fn test_chain_fallback_on_rate_limit() {
        let primary = Arc::new(ScriptedProvider::new("primary").failing(FailureKind::RateLimited));
        let fallback = Arc::new(ScriptedProvider::new("fallback").replying(&["fine"]));
        let chain = ProviderChainBuilder::new()
            .add_shared(primary.clone())
            .add_shared(fallback.clone())
            .build();

        let (result, stats, _) = run(&chain, None).await;
        assert_eq!(result.unwrap().provider, "fallback");
        assert_eq!(primary.calls(), 1);
        assert_eq!(fallback.calls(), 1);
        assert_eq!(stats.attempts.len(), 2);
        assert_eq!(
            stats.attempts[0].error.as_ref().map(|e| e.kind),
            Some(FailureKind::RateLimited)
        );
    }

    #[tokio::test]
    async fn test_chain_exhaustion_lists_every_provider() {
        let chain = ProviderChainBuilder::new()
            .add_provider(ScriptedProvider::new("gemini").failing(FailureKind::RateLimited))
            .add_provider(
                ScriptedProvider::new("ollama")
                    .local()
                    .failing(FailureKind::ModelNotFound),
            )
            .build();

        let (result, _, _) = run(&chain, None).await;
        let failures = result.unwrap_err();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].provider.as_deref(), Some("gemini"));
        assert_eq!(failures[0].kind, FailureKind::RateLimited);
        assert_eq!(failures[1].provider.as_deref(), Some("ollama"));
        assert_eq!(failures[1].kind, FailureKind::ModelNotFound);
    }

    #[tokio::test]
    async fn test_unavailable_provider_skipped_without_call() {
        let offline = Arc::new(ScriptedProvider::new("gemini").unavailable());
        let chain = ProviderChainBuilder::new()
            .add_shared(offline.clone())
            .add_provider(ScriptedProvider::new("ollama").local().replying(&["local answer"]))
            .build();

        let (result, stats, _) = run(&chain, None).await;
        assert_eq!(result.unwrap().provider, "ollama");
        assert_eq!(offline.calls(), 0);
        assert_eq!(stats.providers_skipped_unavailable, 1);
        assert_eq!(
            stats.attempts[0].error.as_ref().map(|e| e.kind),
            Some(FailureKind::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_override_disables_failover() {
        let primary = Arc::new(ScriptedProvider::new("gemini"));
        let local = Arc::new(ScriptedProvider::new("ollama").failing(FailureKind::Unavailable));
        let chain = ProviderChainBuilder::new()
            .add_shared(primary.clone())
            .add_shared(local.clone())
            .build();

        let (result, _, _) = run(&chain, Some("ollama")).await;
        assert_eq!(result.unwrap_err().len(), 1);
        assert_eq!(primary.calls(), 0);
        assert_eq!(local.calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_override_fails_without_calls() {
        let primary = Arc::new(ScriptedProvider::new("gemini"));
        let chain = ProviderChainBuilder::new().add_shared(primary.clone()).build();

        let (result, _, _) = run(&chain, Some("claude")).await;
        let failures = result.unwrap_err();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("Unknown provider"));
        assert_eq!(primary.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_output_is_malformed() {
        let chain = ProviderChainBuilder::new()
            .add_provider(ScriptedProvider::new("gemini").replying(&["", "   "]))
            .build();

        let (result, _, _) = run(&chain, None).await;
        assert_eq!(result.unwrap_err()[0].kind, FailureKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_partial_text_forwarded_before_failover() {
        let chain = ProviderChainBuilder::new()
            .add_provider(
                ScriptedProvider::new("gemini")
                    .failing_after(&["half an "], FailureKind::MalformedResponse),
            )
            .add_provider(ScriptedProvider::new("ollama").replying(&["whole answer"]))
            .build();

        let (result, stats, streamed) = run(&chain, None).await;
        assert_eq!(result.unwrap().text, "whole answer");
        assert_eq!(streamed, "half an whole answer");
        assert_eq!(stats.attempts[0].chunks_forwarded, 1);
    }

    #[tokio::test]
    async fn test_first_chunk_timeout_is_unavailable() {
        let chain = ProviderChainBuilder::new()
            .add_provider(ScriptedProvider::new("gemini").hanging())
            .add_provider(ScriptedProvider::new("ollama").replying(&["late but fine"]))
            .with_config(ChainConfig {
                first_chunk_timeout: Duration::from_millis(20),
            })
            .build();

        let (result, stats, _) = run(&chain, None).await;
        assert_eq!(result.unwrap().provider, "ollama");
        assert_eq!(
            stats.attempts[0].error.as_ref().map(|e| e.kind),
            Some(FailureKind::Unavailable)
        );
    }

    #[tokio::test]
    async fn test_descriptors_in_rank_order() {
        let chain = ProviderChainBuilder::new()
            .add_provider(ScriptedProvider::new("gemini").unavailable())
            .add_provider(ScriptedProvider::new("ollama").local())
            .build();

        let descriptors = chain.descriptors().await;
        assert_eq!(descriptors.len(), 2);
        assert_eq!(descriptors[0].name, "gemini");
        assert_eq!(descriptors[0].rank, 0);
        assert!(!descriptors[0].available);
        assert_eq!(descriptors[1].kind, ProviderKind::Local);
        assert!(descriptors[1].available);

        assert_eq!(chain.available_names().await, vec!["ollama"]);
    }
}
