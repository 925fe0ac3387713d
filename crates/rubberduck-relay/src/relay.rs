//! Streaming relay.
//!
//! Lifecycle of one request:
//!
//! ```text
//! Idle -> Admitted -> UpstreamPending -> Streaming -> Completed
//!                           |                 \
//!                           v                  -> FailedMidStream
//!                    FailedBeforeBytes
//! ```
//!
//! Before the first delta arrives nothing has been written, so failures map
//! to an ordinary error status. Once a delta has been forwarded the status
//! line is committed; a later upstream failure is reported by appending an
//! inline marker (see [`error_marker`]) and closing the stream.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use rubberduck_providers::{CompletionClient, DeltaStream};
use rubberduck_types::{AnalysisRequest, DeltaChunk, Persona};
use tracing::{debug, info, warn};

use crate::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    Admitted,
    UpstreamPending,
    Streaming,
    Completed,
    FailedBeforeBytes,
    FailedMidStream,
}

impl RelayPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayPhase::Completed | RelayPhase::FailedBeforeBytes | RelayPhase::FailedMidStream
        )
    }
}

/// Terminal outcome of a stream that reached the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Ok,
    UpstreamError,
    ClientDisconnected,
}

/// Text appended to an already-committed stream when upstream fails.
pub fn error_marker(message: &str) -> String {
    format!("\n\n[error: {}]", message)
}

/// Transient per-request bookkeeping. Never persisted.
#[derive(Debug, Clone)]
pub struct StreamState {
    persona: Persona,
    code_chars: usize,
    phase: RelayPhase,
    bytes_forwarded: u64,
    outcome: Option<StreamOutcome>,
}

impl StreamState {
    fn new(request: &AnalysisRequest) -> Self {
        Self {
            persona: request.persona,
            code_chars: request.code_chars(),
            phase: RelayPhase::Idle,
            bytes_forwarded: 0,
            outcome: None,
        }
    }

    fn advance(&mut self, next: RelayPhase) {
        debug!(persona = %self.persona, from = ?self.phase, to = ?next, "relay phase");
        self.phase = next;
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }

    pub fn bytes_forwarded(&self) -> u64 {
        self.bytes_forwarded
    }

    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }
}

/// Opens upstream completions for admitted requests.
#[derive(Clone)]
pub struct Relay {
    client: Arc<dyn CompletionClient>,
}

impl Relay {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Make the single upstream call for `request` and wait for its first
    /// delta. Errors returned here happened before any byte was produced.
    pub async fn open(&self, request: AnalysisRequest) -> Result<RelayStream, RelayError> {
        let mut state = StreamState::new(&request);
        state.advance(RelayPhase::Admitted);

        let user_content = request.user_message();
        state.advance(RelayPhase::UpstreamPending);

        let mut upstream = match self
            .client
            .start_completion(request.persona.system_prompt(), &user_content)
            .await
        {
            Ok(upstream) => upstream,
            Err(e) => return Err(fail_before_bytes(&mut state, e.into())),
        };

        match upstream.next().await {
            Some(Ok(first)) => {
                state.advance(RelayPhase::Streaming);
                Ok(RelayStream {
                    upstream,
                    pending: Some(first),
                    state,
                })
            }
            Some(Err(e)) => Err(fail_before_bytes(&mut state, e.into())),
            None => {
                state.advance(RelayPhase::Completed);
                state.outcome = Some(StreamOutcome::Ok);
                info!(
                    persona = %state.persona,
                    code_chars = state.code_chars,
                    "upstream completed without output"
                );
                Ok(RelayStream {
                    upstream,
                    pending: None,
                    state,
                })
            }
        }
    }
}

fn fail_before_bytes(state: &mut StreamState, err: RelayError) -> RelayError {
    state.advance(RelayPhase::FailedBeforeBytes);
    warn!(
        persona = %state.persona,
        code_chars = state.code_chars,
        kind = err.kind(),
        error = %err,
        "relay failed before first byte"
    );
    err
}

/// Outbound body of a committed response.
///
/// Yields each upstream delta as soon as it arrives, in order. Dropping the
/// stream before it finishes (client disconnect) cancels the upstream call.
pub struct RelayStream {
    upstream: DeltaStream,
    pending: Option<DeltaChunk>,
    state: StreamState,
}

impl RelayStream {
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    fn forward(&mut self, chunk: DeltaChunk) -> Bytes {
        self.state.bytes_forwarded += chunk.len() as u64;
        Bytes::from(chunk.into_string())
    }
}

impl Stream for RelayStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(first) = this.pending.take() {
            return Poll::Ready(Some(Ok(this.forward(first))));
        }

        if this.state.phase.is_terminal() {
            return Poll::Ready(None);
        }

        match ready!(Pin::new(&mut this.upstream).poll_next(cx)) {
            Some(Ok(chunk)) => Poll::Ready(Some(Ok(this.forward(chunk)))),
            Some(Err(e)) => {
                this.state.advance(RelayPhase::FailedMidStream);
                this.state.outcome = Some(StreamOutcome::UpstreamError);
                this.upstream.cancel();
                warn!(
                    persona = %this.state.persona,
                    code_chars = this.state.code_chars,
                    bytes_forwarded = this.state.bytes_forwarded,
                    kind = e.kind(),
                    error = %e,
                    "upstream failed mid-stream"
                );
                let marker = error_marker("upstream provider failed; response truncated");
                Poll::Ready(Some(Ok(Bytes::from(marker))))
            }
            None => {
                this.state.advance(RelayPhase::Completed);
                this.state.outcome = Some(StreamOutcome::Ok);
                info!(
                    persona = %this.state.persona,
                    code_chars = this.state.code_chars,
                    bytes_forwarded = this.state.bytes_forwarded,
                    "stream completed"
                );
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        if self.state.outcome.is_none() {
            self.state.outcome = Some(StreamOutcome::ClientDisconnected);
            self.upstream.cancel();
            info!(
                persona = %self.state.persona,
                bytes_forwarded = self.state.bytes_forwarded,
                "client disconnected; upstream released"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockCompletionClient, MockFailure};

    async fn drain(stream: &mut RelayStream) -> String {
        let mut out = Vec::new();
        while let Some(Ok(bytes)) = stream.next().await {
            out.extend_from_slice(&bytes);
        }
        String::from_utf8(out).unwrap()
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new("let x = 1", Persona::Duck)
    }

    #[tokio::test]
    async fn test_chunks_forwarded_in_order() {
        let client = Arc::new(MockCompletionClient::new(&["Hel", "lo, ", "world"]));
        let relay = Relay::new(client.clone());

        let mut stream = relay.open(request()).await.unwrap();
        assert_eq!(stream.state().phase(), RelayPhase::Streaming);
        assert_eq!(drain(&mut stream).await, "Hello, world");
        assert_eq!(stream.state().phase(), RelayPhase::Completed);
        assert_eq!(stream.state().outcome(), Some(StreamOutcome::Ok));
        assert_eq!(stream.state().bytes_forwarded(), 12);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_appends_marker() {
        let client = Arc::new(
            MockCompletionClient::new(&["Par", "tial"]).then_fail(MockFailure::Upstream("boom".into())),
        );
        let relay = Relay::new(client);

        let mut stream = relay.open(request()).await.unwrap();
        let body = drain(&mut stream).await;
        assert_eq!(
            body,
            format!(
                "Partial{}",
                error_marker("upstream provider failed; response truncated")
            )
        );
        assert_eq!(stream.state().phase(), RelayPhase::FailedMidStream);
        assert_eq!(stream.state().outcome(), Some(StreamOutcome::UpstreamError));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_failure_before_first_byte_is_an_error() {
        let client = Arc::new(
            MockCompletionClient::new(&[]).then_fail(MockFailure::Upstream("early".into())),
        );
        let relay = Relay::new(client);
        let err = relay.open(request()).await.err().unwrap();
        assert!(matches!(err, RelayError::UpstreamFailure(_)));
    }

    #[tokio::test]
    async fn test_misconfigured_is_distinct() {
        let client = Arc::new(MockCompletionClient::failing(MockFailure::Misconfigured));
        let relay = Relay::new(client);
        let err = relay.open(request()).await.err().unwrap();
        assert!(matches!(err, RelayError::Misconfigured(_)));
    }

    #[tokio::test]
    async fn test_empty_completion_closes_cleanly() {
        let client = Arc::new(MockCompletionClient::new(&[]));
        let relay = Relay::new(client);
        let mut stream = relay.open(request()).await.unwrap();
        assert_eq!(drain(&mut stream).await, "");
        assert_eq!(stream.state().phase(), RelayPhase::Completed);
    }

    #[tokio::test]
    async fn test_drop_releases_upstream() {
        let client = Arc::new(
            MockCompletionClient::new(&["a"; 64]).with_chunk_delay(std::time::Duration::from_millis(5)),
        );
        let relay = Relay::new(client.clone());

        let mut stream = relay.open(request()).await.unwrap();
        assert!(stream.next().await.is_some());
        drop(stream);

        client.wait_until_released().await;
        assert!(client.was_cancelled());
        assert!(client.chunks_sent() < 64);
    }

    #[tokio::test]
    async fn test_upstream_receives_persona_prompt_and_preamble() {
        let client = Arc::new(MockCompletionClient::new(&["ok"]));
        let relay = Relay::new(client.clone());
        let mut stream = relay.open(request()).await.unwrap();
        drain(&mut stream).await;

        let (system, user) = client.last_request().unwrap();
        assert_eq!(system, Persona::Duck.system_prompt());
        assert_eq!(user, "Here is my code:\n\nlet x = 1");
    }
}
