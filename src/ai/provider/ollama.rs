//! Ollama Local LLM Provider
//!
//! LLM provider for locally-running Ollama models.
//! Streams `/api/chat` as newline-delimited JSON; the closing `done: true`
//! line carries `prompt_eval_count` / `eval_count`.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::{
    GenerationParams, LlmProvider, ProviderConfig, ProviderKind, TokenChunk, TokenStream,
    TokenUsage, prompt_utils,
};
use crate::constants::network as net_constants;
use crate::types::{ErrorClassifier, ExplainError, FailureKind, ProviderError, Result};

pub(super) const PROVIDER_NAME: &str = "ollama";
pub(super) const DEFAULT_API_BASE: &str = "http://localhost:11434";
pub(super) const DEFAULT_MODEL: &str = "llama3.2:1b";

/// Ollama Local LLM Provider
pub struct OllamaProvider {
    api_base: String,
    model: String,
    client: reqwest::Client,
    /// Reachability of `/api/tags`, probed once per process
    availability: OnceCell<bool>,
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let api_base = config
            .api_base
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        // Validate endpoint URL for security (SSRF prevention)
        let api_base = Self::validate_endpoint(&api_base)?;

        let model = config.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(net_constants::CONNECTION_TIMEOUT_SECS))
            .build()
            .map_err(|e| ExplainError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_base,
            model,
            client,
            availability: OnceCell::new(),
        })
    }

    /// Validate endpoint URL for security (SSRF prevention)
    ///
    /// Only allows http/https schemes and warns for non-localhost endpoints.
    fn validate_endpoint(endpoint: &str) -> Result<String> {
        let url = url::Url::parse(endpoint).map_err(|e| {
            ExplainError::Config(format!("Invalid Ollama endpoint URL '{}': {}", endpoint, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExplainError::Config(format!(
                "Ollama endpoint must use http or https scheme, got: {}",
                url.scheme()
            )));
        }

        if let Some(host) = url.host_str()
            && !matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1")
        {
            warn!(
                "Ollama endpoint is not localhost: {}. Ensure this is intentional.",
                host
            );
        }

        // Remove trailing slash for consistency
        let mut result = url.to_string();
        if result.ends_with('/') {
            result.pop();
        }
        Ok(result)
    }

    fn build_request(&self, prompt: &str, params: &GenerationParams) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
            options: ChatOptions {
                temperature: params.temperature,
                num_predict: params.max_tokens,
            },
        }
    }

    /// Models installed in the local Ollama daemon
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.api_base);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(net_constants::HEALTH_CHECK_TIMEOUT_SECS))
            .send()
            .await
            .map_err(|e| {
                ExplainError::Provider(ErrorClassifier::classify_transport(&e, PROVIDER_NAME))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExplainError::Provider(ErrorClassifier::classify_http_status(
                status.as_u16(),
                &format!("Ollama tags request failed ({})", status),
                PROVIDER_NAME,
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            ExplainError::Provider(ProviderError::malformed(
                format!("Failed to parse Ollama tags: {}", e),
                PROVIDER_NAME,
            ))
        })?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn probe(&self) -> bool {
        match self.list_models().await {
            Ok(models) => {
                let base = self.model.trim_end_matches(":latest");
                if models.iter().any(|m| m == &self.model || m.starts_with(base)) {
                    info!("Ollama is available with model: {}", self.model);
                } else {
                    warn!(
                        "Ollama is running but model '{}' not found. Pull with: ollama pull {}",
                        self.model, self.model
                    );
                }
                true
            }
            Err(e) => {
                warn!("Ollama not available: {}. Start with: ollama serve", e);
                false
            }
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn generate<'a>(&'a self, prompt: &'a str, params: &'a GenerationParams) -> TokenStream<'a> {
        Box::pin(async_stream::stream! {
            info!(
                "Generating with Ollama (model: {}, temperature: {})",
                self.model, params.temperature
            );

            let request = self.build_request(prompt, params);
            let url = format!("{}/api/chat", self.api_base);

            let response = match self.client.post(&url).json(&request).send().await {
                Ok(resp) => resp,
                Err(e) if e.is_connect() => {
                    yield Err(ProviderError::unavailable(
                        format!(
                            "Failed to connect to Ollama at {}. Is Ollama running? Start with: ollama serve",
                            self.api_base
                        ),
                        PROVIDER_NAME,
                    ));
                    return;
                }
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
                    &format!("Ollama API error ({}): {}", status, detail),
                    PROVIDER_NAME,
                ));
                return;
            }

            debug!("Ollama stream opened");

            // NDJSON; a chunk boundary may fall inside a UTF-8 character
            let mut lines = LineBuffer::default();
            let mut byte_stream = response.bytes_stream();

            while let Some(result) = byte_stream.next().await {
                let bytes = match result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ErrorClassifier::classify_transport(&e, PROVIDER_NAME));
                        return;
                    }
                };
                lines.push(&bytes);
                while let Some(line) = lines.next_line() {
                    let item = match line {
                        Ok(line) if line.is_empty() => continue,
                        Ok(line) => parse_ndjson_chunk(&line),
                        Err(e) => Err(e),
                    };
                    let failed = item.is_err();
                    yield item;
                    if failed {
                        return;
                    }
                }
            }

            match lines.finish() {
                Some(Ok(rest)) if !rest.is_empty() => yield parse_ndjson_chunk(&rest),
                Some(Err(e)) => yield Err(e),
                _ => {}
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
        ProviderKind::Local
    }

    async fn is_available(&self) -> bool {
        *self.availability.get_or_init(|| self.probe()).await
    }
}

// =============================================================================
// Stream Parsing
// =============================================================================

/// Byte buffer that hands out complete, trimmed NDJSON lines
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// `None` until a newline has been buffered
    fn next_line(&mut self) -> Option<std::result::Result<String, ProviderError>> {
        let end = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        Some(decode_line(&line[..end]))
    }

    /// Whatever followed the last newline
    fn finish(self) -> Option<std::result::Result<String, ProviderError>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(decode_line(&self.pending))
        }
    }
}

fn decode_line(bytes: &[u8]) -> std::result::Result<String, ProviderError> {
    std::str::from_utf8(bytes)
        .map(|line| line.trim().to_string())
        .map_err(|e| {
            ProviderError::malformed(
                format!("Ollama stream line is not valid UTF-8: {}", e),
                PROVIDER_NAME,
            )
        })
}

fn parse_usage(body: &Value) -> Option<TokenUsage> {
    let input = body["prompt_eval_count"].as_u64();
    let output = body["eval_count"].as_u64();
    if input.is_none() && output.is_none() {
        return None;
    }
    Some(TokenUsage::new(input.unwrap_or(0), output.unwrap_or(0)))
}

/// Parse one NDJSON line of an `/api/chat` stream
fn parse_ndjson_chunk(line: &str) -> std::result::Result<TokenChunk, ProviderError> {
    let v: Value = serde_json::from_str(line).map_err(|e| {
        ProviderError::malformed(format!("Invalid Ollama stream line: {}", e), PROVIDER_NAME)
    })?;

    if let Some(message) = v["error"].as_str() {
        return Err(ErrorClassifier::classify(message, PROVIDER_NAME));
    }

    // Each line has {"message":{"role":"assistant","content":"..."}, "done":false}
    let text = v["message"]["content"].as_str().unwrap_or("").to_string();
    let done = v["done"].as_bool().unwrap_or(false);
    let usage = if done { parse_usage(&v) } else { None };

    if !done && v.get("message").is_none() {
        return Err(ProviderError::with_provider(
            FailureKind::MalformedResponse,
            "Ollama stream line has neither message nor done flag",
            PROVIDER_NAME,
        ));
    }

    Ok(TokenChunk { text, usage })
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagsModel>,
}

#[derive(Debug, Deserialize)]
struct TagsModel {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;

    fn provider_for(base_url: &str) -> OllamaProvider {
        OllamaProvider::new(ProviderConfig {
            api_base: Some(base_url.to_string()),
            ..ProviderConfig::ollama()
        })
        .expect("Failed to create provider")
    }

    #[test]
    fn test_default_config() {
        let provider = OllamaProvider::new(ProviderConfig::ollama()).expect("Failed to create provider");
        assert_eq!(provider.api_base, DEFAULT_API_BASE);
        assert_eq!(provider.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_validate_endpoint_rejects_scheme() {
        assert!(matches!(
            OllamaProvider::validate_endpoint("file:///etc/passwd"),
            Err(ExplainError::Config(_))
        ));
        assert!(OllamaProvider::validate_endpoint("not a url").is_err());
    }

    #[test]
    fn test_parse_ndjson_chunks() {
        let chunk =
            parse_ndjson_chunk(r#"{"message":{"role":"assistant","content":"Hi"},"done":false}"#)
                .unwrap();
        assert_eq!(chunk.text, "Hi");
        assert!(chunk.usage.is_none());

        let last = parse_ndjson_chunk(
            r#"{"message":{"role":"assistant","content":""},"done":true,"prompt_eval_count":26,"eval_count":290}"#,
        )
        .unwrap();
        assert_eq!(last.usage, Some(TokenUsage::new(26, 290)));
    }

    #[test]
    fn test_parse_ndjson_error_line() {
        let err = parse_ndjson_chunk(r#"{"error":"model 'llama9' not found, try pulling it first"}"#)
            .unwrap_err();
        assert_eq!(err.kind, FailureKind::ModelNotFound);
    }

    #[test]
    fn test_line_buffer_joins_split_character() {
        let line = r#"{"message":{"content":"café 한"}}"#.as_bytes();
        // Cut inside the two-byte 'é'
        let cut = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut lines = LineBuffer::default();
        lines.push(&line[..cut]);
        assert!(lines.next_line().is_none());
        lines.push(&line[cut..]);
        lines.push(b"\n");

        let decoded = lines.next_line().unwrap().unwrap();
        assert_eq!(parse_ndjson_chunk(&decoded).unwrap().text, "café 한");
        assert!(lines.finish().is_none());
    }

    #[test]
    fn test_line_buffer_rejects_invalid_utf8() {
        let mut lines = LineBuffer::default();
        lines.push(b"{\"message\":{\"content\":\"\xFF\"}}\n");
        let err = lines.next_line().unwrap().unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedResponse);
    }

    #[test]
    fn test_line_buffer_keeps_unterminated_tail() {
        let mut lines = LineBuffer::default();
        lines.push(b"  {\"done\":true}  ");
        assert!(lines.next_line().is_none());
        assert_eq!(lines.finish().unwrap().unwrap(), r#"{"done":true}"#);
    }

    #[tokio::test]
    async fn test_streams_character_split_across_writes() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let body = concat!(
            r#"{"message":{"role":"assistant","content":"café 한"},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":""},"done":true}"#,
            "\n"
        )
        .as_bytes();
        let cut = body.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // Drain the whole request so closing the socket doesn't reset it
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_lowercase();
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let length = text
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(&body[..cut]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            socket.write_all(&body[cut..]).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        let provider = provider_for(&base);
        let params = GenerationParams::default();
        let items: Vec<_> = provider.generate("Explain", &params).collect().await;
        server.await.unwrap();

        let text: String = items
            .into_iter()
            .map(|r| r.unwrap().text)
            .collect();
        assert_eq!(text, "café 한");
    }

    #[tokio::test]
    async fn test_streams_ndjson() {
        let mut server = Server::new_async().await;
        let body = concat!(
            r#"{"message":{"role":"assistant","content":"Loops "},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":"over items."},"done":false}"#,
            "\n",
            r#"{"message":{"role":"assistant","content":""},"done":true,"prompt_eval_count":30,"eval_count":4}"#,
            "\n"
        );
        let mock = server
            .mock("POST", "/api/chat")
            .with_status(200)
            .with_header("content-type", "application/x-ndjson")
            .with_body(body)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let params = GenerationParams::default();
        let items: Vec<_> = provider.generate("Explain", &params).collect().await;
        mock.assert_async().await;

        let chunks: Vec<TokenChunk> = items.into_iter().map(|r| r.unwrap()).collect();
        let text: String = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(text, "Loops over items.");
        assert_eq!(chunks.last().unwrap().usage, Some(TokenUsage::new(30, 4)));
    }

    #[tokio::test]
    async fn test_missing_model_is_model_not_found() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(404)
            .with_body(r#"{"error":"model \"llama3.2:1b\" not found, try pulling it first"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let params = GenerationParams::default();
        let items: Vec<_> = provider.generate("Explain", &params).collect().await;
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].as_ref().unwrap_err().kind,
            FailureKind::ModelNotFound
        );
    }

    #[tokio::test]
    async fn test_availability_memoized() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3.2:1b"},{"name":"qwen2.5-coder:7b"}]}"#)
            .expect(1)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        assert!(provider.is_available().await);
        assert!(provider.is_available().await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_models() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3.2:1b"},{"name":"qwen2.5-coder:7b"}]}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let models = provider.list_models().await.unwrap();
        assert_eq!(models, vec!["llama3.2:1b", "qwen2.5-coder:7b"]);
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_unavailable() {
        // Port 9 (discard) is reliably closed on test hosts
        let provider = provider_for("http://127.0.0.1:9");
        assert!(!provider.is_available().await);
    }
}
