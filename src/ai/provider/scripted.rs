//! In-memory provider that replays a fixed script (test only)

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{
    GenerationParams, LlmProvider, ProviderKind, TokenChunk, TokenStream, TokenUsage,
};
use crate::types::{FailureKind, ProviderError};

#[derive(Debug, Clone)]
enum Reply {
    Chunks {
        chunks: Vec<String>,
        usage: Option<TokenUsage>,
    },
    /// Emit `partial` then fail with `kind`
    Fail {
        partial: Vec<String>,
        kind: FailureKind,
    },
    /// Never yield anything
    Hang,
}

pub(crate) struct ScriptedProvider {
    name: String,
    model: String,
    kind: ProviderKind,
    available: bool,
    reply: Reply,
    chunk_delay: Option<std::time::Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    params: Mutex<Vec<GenerationParams>>,
}

impl ScriptedProvider {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            model: format!("{}-model", name),
            kind: ProviderKind::Cloud,
            available: true,
            reply: Reply::Chunks {
                chunks: vec!["ok".to_string()],
                usage: None,
            },
            chunk_delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn local(mut self) -> Self {
        self.kind = ProviderKind::Local;
        self
    }

    pub(crate) fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub(crate) fn replying(mut self, chunks: &[&str]) -> Self {
        self.reply = Reply::Chunks {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            usage: None,
        };
        self
    }

    pub(crate) fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        if let Reply::Chunks { usage, .. } = &mut self.reply {
            *usage = Some(TokenUsage::new(input_tokens, output_tokens));
        }
        self
    }

    pub(crate) fn failing(mut self, kind: FailureKind) -> Self {
        self.reply = Reply::Fail {
            partial: Vec::new(),
            kind,
        };
        self
    }

    pub(crate) fn failing_after(mut self, partial: &[&str], kind: FailureKind) -> Self {
        self.reply = Reply::Fail {
            partial: partial.iter().map(|c| c.to_string()).collect(),
            kind,
        };
        self
    }

    pub(crate) fn hanging(mut self) -> Self {
        self.reply = Reply::Hang;
        self
    }

    pub(crate) fn with_chunk_delay(mut self, delay: std::time::Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub(crate) fn last_params(&self) -> Option<GenerationParams> {
        self.params.lock().unwrap().last().copied()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn generate<'a>(&'a self, prompt: &'a str, params: &'a GenerationParams) -> TokenStream<'a> {
        Box::pin(async_stream::stream! {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.params.lock().unwrap().push(*params);

            match self.reply.clone() {
                Reply::Chunks { chunks, usage } => {
                    let last = chunks.len().saturating_sub(1);
                    for (i, text) in chunks.into_iter().enumerate() {
                        if let Some(delay) = self.chunk_delay {
                            tokio::time::sleep(delay).await;
                        }
                        let mut chunk = TokenChunk::text(text);
                        if i == last {
                            chunk.usage = usage;
                        }
                        yield Ok(chunk);
                    }
                }
                Reply::Fail { partial, kind } => {
                    for text in partial {
                        yield Ok(TokenChunk::text(text));
                    }
                    yield Err(ProviderError::with_provider(
                        kind,
                        format!("scripted {} failure", kind),
                        self.name.clone(),
                    ));
                }
                Reply::Hang => {
                    futures::future::pending::<()>().await;
                }
            }
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        self.available
    }
}
