//! Stream client: opens the review event stream with bounded retry and
//! delivers typed events in arrival order.

use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::Issue;
use shared::protocol::ReviewEvent;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::transport::ReviewTransport;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Creates a linked cancellation pair. Dropping the handle counts as
/// cancellation, so an abandoned run cannot outlive its owner.
pub fn cancellation_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once cancelled (or once the handle is gone).
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// How one stream run ended. Delivered exactly once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Failed(String),
    Aborted,
}

/// Receives issue batches in arrival order. Terminal conditions are not
/// delivered here; they are the run's outcome.
#[async_trait]
pub trait IssueSink: Send + Sync {
    async fn on_issues(&self, issues: Vec<Issue>);
}

pub struct StreamClient {
    transport: Arc<dyn ReviewTransport>,
    max_retries: u32,
}

impl StreamClient {
    pub fn new(transport: Arc<dyn ReviewTransport>) -> Self {
        Self {
            transport,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Open attempt loop. Only pre-open "service unavailable" failures are
    /// retried, so no delivered event is ever replayed; the counter is local
    /// to this run.
    async fn open_with_retry(
        &self,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<crate::transport::SseMessageStream, TransportError> {
        let mut retries: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(TransportError::Aborted);
            }
            match self.transport.open_stream(path).await {
                Ok(stream) => return Ok(stream),
                Err(TransportError::Retriable(message)) if retries < self.max_retries => {
                    retries += 1;
                    warn!(
                        retries,
                        max_retries = self.max_retries,
                        %message,
                        "stream open unavailable, retrying"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs one stream to termination. Issue batches go to `sink` in arrival
    /// order; `complete` closes the connection proactively; an in-stream
    /// `error` event or an unknown event kind fails the run with no retry;
    /// cancellation aborts silently at any point.
    pub async fn run(&self, path: &str, mut cancel: CancelToken, sink: &dyn IssueSink) -> RunOutcome {
        let mut messages = match self.open_with_retry(path, &cancel).await {
            Ok(stream) => stream,
            Err(TransportError::Aborted) => return RunOutcome::Aborted,
            Err(err) => return RunOutcome::Failed(err.to_string()),
        };

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return RunOutcome::Aborted,
                next = messages.next() => next,
            };

            let raw = match next {
                Some(Ok(raw)) => raw,
                Some(Err(err)) => return RunOutcome::Failed(err.to_string()),
                None => {
                    return RunOutcome::Failed(
                        "stream closed before completion".to_string(),
                    )
                }
            };

            match ReviewEvent::parse(&raw) {
                Ok(ReviewEvent::Issues(issues)) => {
                    debug!(count = issues.len(), "issues event received");
                    sink.on_issues(issues).await;
                }
                Ok(ReviewEvent::Complete) => {
                    // Dropping the stream closes the connection; anything the
                    // server sends after `complete` is discarded.
                    info!("review stream complete");
                    return RunOutcome::Completed;
                }
                Ok(ReviewEvent::Error(message)) => {
                    return RunOutcome::Failed(message);
                }
                Ok(ReviewEvent::Unknown(kind)) => {
                    return RunOutcome::Failed(TransportError::UnknownEvent(kind).to_string());
                }
                Err(err) => return RunOutcome::Failed(err.to_string()),
            }
        }
    }
}
