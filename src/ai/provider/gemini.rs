//! Gemini Cloud Provider
//!
//! Streams completions from Google's Generative Language API using
//! server-sent events (`streamGenerateContent?alt=sse`).
//! The final event carries `usageMetadata` with aggregate token counts.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::{
    GenerationParams, LlmProvider, ProviderConfig, ProviderKind, TokenChunk, TokenStream,
    TokenUsage, prompt_utils,
};
use crate::constants::network as net_constants;
use crate::types::{ErrorClassifier, ExplainError, FailureKind, ProviderError, Result};

pub(super) const PROVIDER_NAME: &str = "gemini";
pub(super) const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Gemini API Provider with secure API key handling
pub struct GeminiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: Option<SecretString>,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiProvider {
    /// Build the provider; a missing key is not an error, the provider
    /// simply reports itself unavailable.
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExplainError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            api_base,
            model,
            client,
        })
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }

    fn build_request(&self, prompt: &str, params: &GenerationParams) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
            },
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn generate<'a>(&'a self, prompt: &'a str, params: &'a GenerationParams) -> TokenStream<'a> {
        Box::pin(async_stream::stream! {
            let Some(api_key) = self.api_key.as_ref() else {
                yield Err(ProviderError::unavailable(
                    format!("Gemini API key not found. Set {} or llm.gemini.api_key", API_KEY_ENV),
                    PROVIDER_NAME,
                ));
                return;
            };

            info!(
                "Generating with Gemini (model: {}, temperature: {})",
                self.model, params.temperature
            );

            let request = self.build_request(prompt, params);
            let response = self
                .client
                .post(self.stream_url())
                .header("x-goog-api-key", api_key.expose_secret())
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(resp) => resp,
                Err(e) => {
                    yield Err(ErrorClassifier::classify_transport(&e, PROVIDER_NAME));
                    return;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let detail = prompt_utils::json_error_message(&body)
                    .unwrap_or_else(|| prompt_utils::error_body_excerpt(&body));
                yield Err(ErrorClassifier::classify_http_status(
                    status.as_u16(),
                    &format!("Gemini API error ({}): {}", status, detail),
                    PROVIDER_NAME,
                ));
                return;
            }

            debug!("Gemini stream opened");

            let mut events = response.bytes_stream().eventsource();
            while let Some(event) = events.next().await {
                match event {
                    Ok(ev) => match parse_stream_event(&ev.data) {
                        Ok(Some(chunk)) => yield Ok(chunk),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    },
                    Err(e) => {
                        yield Err(ProviderError::malformed(
                            format!("SSE parse error: {}", e),
                            PROVIDER_NAME,
                        ));
                        return;
                    }
                }
            }
        })
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

// =============================================================================
// Stream Parsing
// =============================================================================

fn parse_usage(usage: &Value) -> Option<TokenUsage> {
    if usage.is_null() {
        return None;
    }
    Some(TokenUsage {
        input_tokens: usage["promptTokenCount"].as_u64().unwrap_or(0),
        output_tokens: usage["candidatesTokenCount"].as_u64().unwrap_or(0),
    })
}

/// Parse one SSE `data:` payload.
///
/// Returns `Ok(None)` for keep-alive or empty payloads and `Err` when the
/// event carries an API error or is not JSON.
fn parse_stream_event(data: &str) -> std::result::Result<Option<TokenChunk>, ProviderError> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let v: Value = serde_json::from_str(data).map_err(|e| {
        ProviderError::malformed(format!("Invalid Gemini stream event: {}", e), PROVIDER_NAME)
    })?;

    if let Some(error) = v.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        return Err(match error["code"].as_u64() {
            Some(code) => ErrorClassifier::classify_http_status(code as u16, message, PROVIDER_NAME),
            None => ErrorClassifier::classify(message, PROVIDER_NAME),
        });
    }

    let text: String = v["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    let usage = parse_usage(&v["usageMetadata"]);

    if text.is_empty() && usage.is_none() {
        if let Some(reason) = v["promptFeedback"]["blockReason"].as_str() {
            return Err(ProviderError::with_provider(
                FailureKind::MalformedResponse,
                format!("Prompt blocked by Gemini: {}", reason),
                PROVIDER_NAME,
            ));
        }
        return Ok(None);
    }

    Ok(Some(TokenChunk { text, usage }))
}

// Request types

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}
