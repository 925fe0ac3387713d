//! Scripted completion client for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rubberduck_providers::{
    delta_channel, CompletionClient, DeltaStream, ProviderError, ProviderResult,
};
use rubberduck_types::DeltaChunk;

#[derive(Debug, Clone)]
pub enum MockFailure {
    Misconfigured,
    Upstream(String),
}

impl MockFailure {
    fn at_start(&self) -> ProviderError {
        match self {
            Self::Misconfigured => ProviderError::Misconfigured("mock: no API key".into()),
            Self::Upstream(message) => ProviderError::Api {
                status: 500,
                body: message.clone(),
            },
        }
    }

    fn mid_stream(&self) -> ProviderError {
        match self {
            Self::Misconfigured => ProviderError::Misconfigured("mock: no API key".into()),
            Self::Upstream(message) => ProviderError::StreamError(message.clone()),
        }
    }
}

/// Yields a fixed list of chunks, optionally followed by a failure.
pub struct MockCompletionClient {
    chunks: Vec<String>,
    immediate_failure: Option<MockFailure>,
    trailing_failure: Option<MockFailure>,
    chunk_delay: Option<Duration>,
    call_count: AtomicUsize,
    last_request: Mutex<Option<(String, String)>>,
    progress: Arc<Progress>,
}

#[derive(Default)]
struct Progress {
    sent: AtomicUsize,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

impl MockCompletionClient {
    pub fn new(chunks: &[&str]) -> Self {
        Self {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            immediate_failure: None,
            trailing_failure: None,
            chunk_delay: None,
            call_count: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            progress: Arc::new(Progress::default()),
        }
    }

    /// Fail at `start_completion` without producing a stream.
    pub fn failing(failure: MockFailure) -> Self {
        let mut client = Self::new(&[]);
        client.immediate_failure = Some(failure);
        client
    }

    /// Fail after all chunks have been yielded.
    pub fn then_fail(mut self, failure: MockFailure) -> Self {
        self.trailing_failure = Some(failure);
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<(String, String)> {
        self.last_request.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn chunks_sent(&self) -> usize {
        self.progress.sent.load(Ordering::SeqCst)
    }

    /// `true` once the producer stopped because the consumer went away.
    pub fn was_cancelled(&self) -> bool {
        self.progress.cancelled.load(Ordering::SeqCst)
    }

    /// Wait (up to five seconds) for the producer task to exit.
    pub async fn wait_until_released(&self) {
        let progress = self.progress.clone();
        let waited = tokio::time::timeout(Duration::from_secs(5), async move {
            while !progress.finished.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "mock producer never exited");
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn start_completion(
        &self,
        system_prompt: &str,
        user_content: &str,
    ) -> ProviderResult<DeltaStream> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap_or_else(|p| p.into_inner()) =
            Some((system_prompt.to_string(), user_content.to_string()));

        if let Some(failure) = &self.immediate_failure {
            return Err(failure.at_start());
        }

        let (tx, stream) = delta_channel(1);
        let chunks: Vec<DeltaChunk> = self.chunks.iter().filter_map(DeltaChunk::new).collect();
        let trailing = self.trailing_failure.clone();
        let delay = self.chunk_delay;
        let progress = self.progress.clone();

        tokio::spawn(async move {
            for chunk in chunks {
                if let Some(delay) = delay {
                    tokio::select! {
                        _ = tx.cancelled() => {
                            progress.cancelled.store(true, Ordering::SeqCst);
                            progress.finished.store(true, Ordering::SeqCst);
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                if !tx.send(Ok(chunk)).await {
                    progress.cancelled.store(true, Ordering::SeqCst);
                    progress.finished.store(true, Ordering::SeqCst);
                    return;
                }
                progress.sent.fetch_add(1, Ordering::SeqCst);
            }
            if let Some(failure) = trailing {
                tx.send(Err(failure.mid_stream())).await;
            }
            progress.finished.store(true, Ordering::SeqCst);
        });

        Ok(stream)
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
