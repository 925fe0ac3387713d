//! OpenAI client implementation

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use rubberduck_types::DeltaChunk;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    delta_channel, CompletionClient, DeltaSender, DeltaStream, ProviderConfig, ProviderError,
    ProviderResult,
};

/// Deltas buffered between the upstream reader and the relay.
const DELTA_CHANNEL_CAPACITY: usize = 16;
const MAX_ERROR_BODY_CHARS: usize = 500;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// OpenAI-compatible chat-completions client
pub struct OpenAIClient {
    client: Client,
    config: ProviderConfig,
}

impl OpenAIClient {
    /// Build a client. A missing credential is not an error here; it is
    /// reported by [`CompletionClient::start_completion`] instead.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request<'a>(&'a self, system_prompt: &'a str, user_content: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: self.config.max_output_tokens,
            stream: true,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url_trimmed())
    }
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    async fn start_completion(
        &self,
        system_prompt: &str,
        user_content: &str,
    ) -> ProviderResult<DeltaStream> {
        let api_key = self.config.api_key.as_ref().ok_or_else(|| {
            ProviderError::Misconfigured(
                "no upstream API key configured (set OPENAI_API_KEY or LLM_API_KEY)".into(),
            )
        })?;

        let request = self.build_request(system_prompt, user_content);
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
            });
        }

        let (tx, stream) = delta_channel(DELTA_CHANNEL_CAPACITY);
        tokio::spawn(pump_sse(response, tx));
        Ok(stream)
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

/// Read the SSE body and forward text deltas until `[DONE]`, end of body,
/// an error, or cancellation. Returning drops the response, which closes the
/// upstream connection.
async fn pump_sse(response: reqwest::Response, tx: DeltaSender) {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.cancelled() => {
                debug!("upstream stream cancelled by consumer");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(&bytes);
                // Lines are decoded only once complete, so multi-byte
                // characters split across network chunks survive.
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    if !forward_line(line.trim(), &tx).await {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "upstream stream read failed");
                tx.send(Err(ProviderError::StreamError(e.to_string()))).await;
                return;
            }
            None => {
                if !buffer.is_empty() {
                    let line = String::from_utf8_lossy(&buffer).into_owned();
                    match parse_sse_line(line.trim()) {
                        SseLine::Done => return,
                        SseLine::Skip => {}
                        SseLine::Delta(chunk) => {
                            if !tx.send(Ok(chunk)).await {
                                return;
                            }
                        }
                        SseLine::Error(message) => {
                            tx.send(Err(ProviderError::StreamError(message))).await;
                            return;
                        }
                    }
                }
                // A body that ends without `[DONE]` was cut off upstream.
                warn!("upstream stream ended without [DONE]");
                tx.send(Err(ProviderError::StreamError(
                    "upstream stream ended before completion".into(),
                )))
                .await;
                return;
            }
        }
    }
}

/// Returns `false` when the producer should stop.
async fn forward_line(line: &str, tx: &DeltaSender) -> bool {
    match parse_sse_line(line) {
        SseLine::Skip => true,
        SseLine::Done => false,
        SseLine::Delta(chunk) => tx.send(Ok(chunk)).await,
        SseLine::Error(message) => {
            tx.send(Err(ProviderError::StreamError(message))).await;
            false
        }
    }
}

#[derive(Debug, PartialEq)]
enum SseLine {
    Skip,
    Done,
    Delta(DeltaChunk),
    Error(String),
}

fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
        // `event:`, `id:`, `retry:` carry nothing we forward.
        return SseLine::Skip;
    };

    if data == "[DONE]" {
        return SseLine::Done;
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            return SseLine::Error(format!("invalid upstream event: {}", e));
        }
    };

    if let Some(error) = chunk.error {
        return SseLine::Error(error.message);
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .and_then(DeltaChunk::new)
        .map(SseLine::Delta)
        .unwrap_or(SseLine::Skip)
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}... [truncated]", text.chars().take(max).collect::<String>())
    } else {
        text.to_string()
    }
}

// API request/response types
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamErrorPayload>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamErrorPayload {
    message: String,
}
