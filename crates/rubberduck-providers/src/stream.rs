//! Cancellable delta channel.
//!
//! The producer half ([`DeltaSender`]) lives in a spawned task that reads the
//! upstream body. The consumer half ([`DeltaStream`]) is handed to the relay.
//! The channel is bounded, so a slow client slows the upstream read instead
//! of growing a buffer. Dropping the consumer cancels the producer.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use rubberduck_types::DeltaChunk;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::ProviderError;

pub type DeltaResult = Result<DeltaChunk, ProviderError>;

/// Create a bounded delta channel.
pub fn delta_channel(capacity: usize) -> (DeltaSender, DeltaStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let cancel = CancellationToken::new();
    let sender = DeltaSender {
        tx,
        cancel: cancel.clone(),
    };
    let stream = DeltaStream {
        rx,
        _guard: cancel.clone().drop_guard(),
        cancel,
    };
    (sender, stream)
}

/// Producer half of a delta channel.
#[derive(Debug)]
pub struct DeltaSender {
    tx: mpsc::Sender<DeltaResult>,
    cancel: CancellationToken,
}

impl DeltaSender {
    /// Push one item. Returns `false` once the consumer has gone away; the
    /// producer must stop at that point.
    pub async fn send(&self, item: DeltaResult) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }

    /// Resolves when the consumer cancels or is dropped.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

/// Consumer half of a delta channel.
#[derive(Debug)]
pub struct DeltaStream {
    rx: mpsc::Receiver<DeltaResult>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl DeltaStream {
    /// Tell the producer to stop. Items already buffered are discarded.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for DeltaStream {
    type Item = DeltaResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
