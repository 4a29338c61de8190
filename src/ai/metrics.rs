//! Streaming Performance Metrics
//!
//! Per-request instrumentation of a streamed generation: time to first token,
//! total latency, decoded token count and decode throughput.
//!
//! ## Usage
//!
//! ```ignore
//! let mut metrics = MetricsCollector::start();
//! while let Some(chunk) = stream.next().await {
//!     metrics.observe(&chunk?);
//! }
//! let summary = metrics.finish();
//! ```

use std::time::{Duration, Instant};

use crate::ai::provider::{TokenChunk, TokenUsage};
use crate::types::PerformanceMetrics;

// =============================================================================
// Metrics Collector
// =============================================================================

/// Collector for one explanation request.
///
/// Owned by the orchestrator for the duration of a single request; not shared.
#[derive(Debug)]
pub struct MetricsCollector {
    /// Request start time
    start_time: Instant,
    /// Offset of the first non-empty chunk of the current attempt
    first_token: Option<Duration>,
    /// Non-empty chunks seen in the current attempt
    chunk_count: u64,
    /// Last usage reported by the backend in the current attempt
    usage: Option<TokenUsage>,
    /// Frozen result, set by `finish`
    frozen: Option<PerformanceMetrics>,
}

impl MetricsCollector {
    /// Start measuring at the current instant
    pub fn start() -> Self {
        Self::start_at(Instant::now())
    }

    pub fn start_at(start_time: Instant) -> Self {
        Self {
            start_time,
            first_token: None,
            chunk_count: 0,
            usage: None,
            frozen: None,
        }
    }

    /// Discard counters from a failed provider attempt.
    ///
    /// The request start time is kept, so latencies of a failover include the
    /// time spent on earlier providers.
    pub fn begin_attempt(&mut self) {
        if self.frozen.is_some() {
            return;
        }
        self.first_token = None;
        self.chunk_count = 0;
        self.usage = None;
    }

    /// Record a received chunk
    pub fn observe(&mut self, chunk: &TokenChunk) {
        self.observe_at(chunk, Instant::now());
    }

    pub fn observe_at(&mut self, chunk: &TokenChunk, at: Instant) {
        if self.frozen.is_some() {
            return;
        }
        if !chunk.text.is_empty() {
            if self.first_token.is_none() {
                self.first_token = Some(at.saturating_duration_since(self.start_time));
            }
            self.chunk_count += 1;
        }
        if let Some(usage) = chunk.usage {
            self.usage = Some(usage);
        }
    }

    /// Whether a non-empty chunk has been observed in the current attempt
    pub fn has_first_token(&self) -> bool {
        self.first_token.is_some()
    }

    /// Freeze and return the metrics; later calls return the same values
    pub fn finish(&mut self) -> PerformanceMetrics {
        self.finish_at(Instant::now())
    }

    pub fn finish_at(&mut self, at: Instant) -> PerformanceMetrics {
        if let Some(frozen) = &self.frozen {
            return frozen.clone();
        }

        let total = at.saturating_duration_since(self.start_time);
        let ttft = self.first_token.unwrap_or(total);

        let tokens_decoded = match self.usage {
            Some(usage) if usage.output_tokens > 0 => usage.output_tokens,
            _ => self.chunk_count,
        };

        let metrics = PerformanceMetrics {
            time_to_first_token_ms: ttft.as_millis() as u64,
            total_time_ms: total.as_millis() as u64,
            tokens_decoded,
            input_tokens: self.usage.map(|u| u.input_tokens).unwrap_or(0),
            tokens_per_second: tokens_per_second(tokens_decoded, total.saturating_sub(ttft)),
            cache_hit: false,
        };

        self.frozen = Some(metrics.clone());
        metrics
    }
}

/// Decode throughput: tokens over the time between first token and completion.
///
/// `None` when nothing was decoded or decode time is zero.
pub fn tokens_per_second(tokens: u64, decode_time: Duration) -> Option<f64> {
    let secs = decode_time.as_secs_f64();
    if tokens == 0 || secs <= 0.0 {
        return None;
    }
    Some(tokens as f64 / secs)
}
