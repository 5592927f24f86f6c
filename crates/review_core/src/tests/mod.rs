
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::Method;
use shared::domain::{FileDescriptor, Issue, IssueStatus, Location};
use shared::protocol::SseMessage;
use tokio::sync::{broadcast, Mutex};

use crate::error::TransportError;
use crate::overlay::{AnnotationHandle, AnnotationOverlay, HighlightColor};
use crate::session::SessionEvent;
use crate::storage::DocumentStore;
use crate::transport::{ReviewTransport, SseMessageStream};

pub(crate) fn issue(id: &str, kind: &str, location: Option<Location>) -> Issue {
    Issue {
        id: id.to_string(),
        doc_id: "contract.pdf".to_string(),
        text: format!("finding {id}"),
        kind: kind.to_string(),
        status: IssueStatus::NotReviewed,
        explanation: "original explanation".to_string(),
        suggested_fix: "original fix".to_string(),
        location,
        review_initiated_by: "reviewer@example.com".to_string(),
        review_initiated_at_utc: "2024-01-01T00:00:00Z".parse().expect("timestamp"),
        resolved_at_utc: None,
        resolved_by: None,
        modified_fields: None,
        dismissal_feedback: None,
    }
}

pub(crate) fn located(page_num: u32, bounding_box: Vec<f64>) -> Option<Location> {
    Some(Location {
        source_sentence: "The quick brown fox.".to_string(),
        page_num,
        bounding_box,
        para_index: 0,
    })
}

pub(crate) fn sse(event: &str, data: &str) -> SseMessage {
    SseMessage {
        event: event.to_string(),
        data: data.to_string(),
    }
}

pub(crate) fn issues_message(issues: &[Issue]) -> SseMessage {
    sse("issues", &serde_json::to_string(issues).expect("serialize"))
}

/// Scripts the transport one open attempt at a time.
pub(crate) enum OpenScript {
    Fail(TransportError),
    /// Yields the messages, then the server closes the stream.
    Events(Vec<SseMessage>),
    /// Yields the messages, then stays open forever (for cancellation tests).
    EventsThenHang(Vec<SseMessage>),
}

pub(crate) struct ScriptedTransport {
    opens: Mutex<VecDeque<OpenScript>>,
    pub open_count: AtomicU32,
    pub requests: Mutex<Vec<(Method, String, Option<serde_json::Value>)>>,
    responses: Mutex<VecDeque<Result<serde_json::Value, TransportError>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(opens: Vec<OpenScript>) -> Self {
        Self {
            opens: Mutex::new(opens.into()),
            open_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) async fn push_response(&self, response: Result<serde_json::Value, TransportError>) {
        self.responses.lock().await.push_back(response);
    }

    pub(crate) fn opens_attempted(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewTransport for ScriptedTransport {
    async fn open_stream(&self, _path: &str) -> Result<SseMessageStream, TransportError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        match self.opens.lock().await.pop_front() {
            None => Err(TransportError::Fatal("no scripted open".to_string())),
            Some(OpenScript::Fail(err)) => Err(err),
            Some(OpenScript::Events(messages)) => {
                Ok(stream::iter(messages.into_iter().map(Ok)).boxed())
            }
            Some(OpenScript::EventsThenHang(messages)) => Ok(stream::iter(
                messages.into_iter().map(Ok),
            )
            .chain(stream::pending())
            .boxed()),
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError> {
        self.requests
            .lock()
            .await
            .push((method, path.to_string(), body));
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Fatal("no scripted response".to_string())))
    }
}

/// Records every overlay call and hands out distinguishable buffers.
pub(crate) struct RecordingOverlay {
    pub adds: Mutex<Vec<(u32, Vec<f64>, Option<HighlightColor>)>>,
    pub deletes: Mutex<Vec<AnnotationHandle>>,
    next_handle: AtomicU64,
}

impl RecordingOverlay {
    pub(crate) fn new() -> Self {
        Self {
            adds: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    pub(crate) async fn selection_adds(&self) -> Vec<(u32, Vec<f64>)> {
        self.adds
            .lock()
            .await
            .iter()
            .filter(|(_, _, color)| color.is_some())
            .map(|(page, bbox, _)| (*page, bbox.clone()))
            .collect()
    }
}

#[async_trait]
impl AnnotationOverlay for RecordingOverlay {
    async fn init(&self, document: Vec<u8>) -> Result<Vec<u8>> {
        Ok(document)
    }

    async fn add(
        &self,
        page_num: u32,
        bounding_box: &[f64],
        color: Option<HighlightColor>,
    ) -> Result<(Vec<u8>, AnnotationHandle)> {
        self.adds
            .lock()
            .await
            .push((page_num, bounding_box.to_vec(), color));
        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        Ok((
            format!("doc-after-add-{id}").into_bytes(),
            AnnotationHandle(format!("h{id}")),
        ))
    }

    async fn delete(&self, handle: &AnnotationHandle) -> Result<Vec<u8>> {
        self.deletes.lock().await.push(handle.clone());
        Ok(b"doc-after-delete".to_vec())
    }
}

pub(crate) struct FixedDocumentStore {
    bytes: Vec<u8>,
}

impl FixedDocumentStore {
    pub(crate) fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

#[async_trait]
impl DocumentStore for FixedDocumentStore {
    async fn list(&self) -> Result<Vec<FileDescriptor>> {
        Ok(Vec::new())
    }

    async fn get(&self, _name: &str) -> Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    async fn put(&self, _name: &str, _bytes: Vec<u8>) -> Result<()> {
        Ok(())
    }
}

pub(crate) async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<SessionEvent>,
    predicate: F,
) -> SessionEvent
where
    F: Fn(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = rx.recv().await.expect("session event channel closed");
            if predicate(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}
