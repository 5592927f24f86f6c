//! Review session: binds one stream run to an issue store and mediates the
//! annotation overlay.
//!
//! A session owns at most one live stream run. Starting a new check cancels
//! the previous run before the new stream is opened, and every run carries a
//! generation number so late responses from a cancelled run are discarded
//! instead of mutating state.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use shared::domain::{Issue, IssueStatus, ModifiedFields};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::overlay::{AnnotationHandle, AnnotationOverlay, HighlightColor};
use crate::storage::DocumentStore;
use crate::store::IssueStore;
use crate::stream::{cancellation_pair, CancelHandle, IssueSink, RunOutcome, StreamClient};
use crate::transport::ReviewTransport;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session's document buffer changed; fetch it via
    /// [`ReviewSession::current_document`].
    DocumentUpdated,
    IssuesAppended { count: usize },
    CheckCompleted,
    CheckFailed(String),
    SelectionChanged(Option<String>),
    PageChanged(u32),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckStatus {
    pub in_progress: bool,
    pub complete: bool,
    pub error: Option<String>,
}

struct ActiveRun {
    cancel: CancelHandle,
}

struct SessionState {
    doc_id: Option<String>,
    document: Option<Vec<u8>>,
    store: IssueStore,
    run_generation: u64,
    active_run: Option<ActiveRun>,
    check_in_progress: bool,
    check_complete: bool,
    check_error: Option<String>,
    selected_issue: Option<String>,
    selection_handle: Option<AnnotationHandle>,
    page_num: u32,
}

impl SessionState {
    fn empty() -> Self {
        Self {
            doc_id: None,
            document: None,
            store: IssueStore::new(),
            run_generation: 0,
            active_run: None,
            check_in_progress: false,
            check_complete: false,
            check_error: None,
            selected_issue: None,
            selection_handle: None,
            page_num: 1,
        }
    }
}

pub struct ReviewSession {
    stream_client: StreamClient,
    transport: Arc<dyn ReviewTransport>,
    overlay: Arc<dyn AnnotationOverlay>,
    documents: Arc<dyn DocumentStore>,
    inner: Mutex<SessionState>,
    // Serializes selection toggles; see select_issue.
    select_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl ReviewSession {
    pub fn new(
        transport: Arc<dyn ReviewTransport>,
        overlay: Arc<dyn AnnotationOverlay>,
        documents: Arc<dyn DocumentStore>,
    ) -> Arc<Self> {
        Self::with_max_retries(transport, overlay, documents, crate::stream::DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(
        transport: Arc<dyn ReviewTransport>,
        overlay: Arc<dyn AnnotationOverlay>,
        documents: Arc<dyn DocumentStore>,
        max_retries: u32,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            stream_client: StreamClient::new(Arc::clone(&transport)).with_max_retries(max_retries),
            transport,
            overlay,
            documents,
            inner: Mutex::new(SessionState::empty()),
            select_lock: Mutex::new(()),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Fetches the document bytes, initializes the annotation overlay and
    /// resets the session for the new document id. Any run bound to the
    /// previous document is cancelled.
    pub async fn load_document(&self, doc_id: &str) -> Result<()> {
        let generation = {
            let mut inner = self.inner.lock().await;
            inner.run_generation += 1;
            if let Some(run) = inner.active_run.take() {
                run.cancel.cancel();
            }
            inner.run_generation
        };

        let bytes = self
            .documents
            .get(doc_id)
            .await
            .with_context(|| format!("failed to load document '{doc_id}'"))?;
        let document = self
            .overlay
            .init(bytes)
            .await
            .context("failed to initialize annotation overlay")?;

        {
            let mut inner = self.inner.lock().await;
            let mut fresh = SessionState::empty();
            fresh.doc_id = Some(doc_id.to_string());
            fresh.document = Some(document);
            fresh.run_generation = generation;
            *inner = fresh;
        }
        info!(%doc_id, "document loaded");
        let _ = self.events.send(SessionEvent::DocumentUpdated);
        Ok(())
    }

    /// Starts a review check for the loaded document. An already active run
    /// is cancelled first; flags and the previous error are reset.
    pub async fn start_check(self: &Arc<Self>) -> Result<()> {
        let (doc_id, generation) = {
            let mut inner = self.inner.lock().await;
            let doc_id = inner
                .doc_id
                .clone()
                .ok_or_else(|| anyhow!("no document loaded"))?;
            if let Some(run) = inner.active_run.take() {
                run.cancel.cancel();
            }
            inner.run_generation += 1;
            inner.check_in_progress = true;
            inner.check_complete = false;
            inner.check_error = None;
            (doc_id, inner.run_generation)
        };

        let (cancel, token) = cancellation_pair();
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let path = format!("{doc_id}/issues");
            info!(%path, generation, "starting review check");
            let sink = RunSink {
                session: Arc::clone(&session),
                generation,
            };
            let outcome = session.stream_client.run(&path, token, &sink).await;
            session.finish_run(generation, outcome).await;
        });

        let mut inner = self.inner.lock().await;
        if inner.run_generation == generation {
            inner.active_run = Some(ActiveRun { cancel });
        } else {
            // A newer run started while this one was being spawned.
            cancel.cancel();
        }
        Ok(())
    }

    /// Cancels the active run, if any. Deliberate cancellation is silent:
    /// no failure is recorded and no error event is published.
    pub async fn cancel_check(&self) {
        let mut inner = self.inner.lock().await;
        inner.run_generation += 1;
        if let Some(run) = inner.active_run.take() {
            run.cancel.cancel();
        }
        inner.check_in_progress = false;
    }

    /// Tears the session down: cancels the run and drops the store, the
    /// document buffer and the selection handle.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        let generation = inner.run_generation + 1;
        if let Some(run) = inner.active_run.take() {
            run.cancel.cancel();
        }
        *inner = SessionState::empty();
        inner.run_generation = generation;
    }

    /// Toggles selection of an issue. The previous selection highlight is
    /// removed first; the new selection gets an emphasis highlight when it
    /// has geometry, and the view is pointed at its page. At most one
    /// selection handle is ever live.
    pub async fn select_issue(&self, id: &str) -> Result<()> {
        // One toggle at a time: the previous handle must reach overlay.delete
        // before the next toggle takes the slot, or a highlight leaks.
        let _toggle = self.select_lock.lock().await;
        let previous_handle;
        let selection;
        let mut jump_page = None;
        let mut draw_target: Option<(u32, Vec<f64>)> = None;
        {
            let mut inner = self.inner.lock().await;
            previous_handle = inner.selection_handle.take();
            if inner.selected_issue.as_deref() == Some(id) {
                inner.selected_issue = None;
            } else {
                let issue = inner
                    .store
                    .get(id)
                    .ok_or_else(|| StoreError::UnknownIssue(id.to_string()))?;
                if let Some(location) = &issue.location {
                    jump_page = Some(location.page_num);
                    if location.has_bounding_box() {
                        draw_target = Some((location.page_num, location.bounding_box.clone()));
                    }
                }
                inner.selected_issue = Some(id.to_string());
            }
            selection = inner.selected_issue.clone();
        }

        let mut document_updated = false;
        if let Some(handle) = previous_handle {
            match self.overlay.delete(&handle).await {
                Ok(bytes) => {
                    self.inner.lock().await.document = Some(bytes);
                    document_updated = true;
                }
                Err(err) => warn!(error = %err, "failed to remove selection highlight"),
            }
        }

        if let Some((page_num, bounding_box)) = draw_target {
            let (bytes, handle) = self
                .overlay
                .add(page_num, &bounding_box, Some(HighlightColor::SELECTION))
                .await
                .context("failed to draw selection highlight")?;
            let mut inner = self.inner.lock().await;
            inner.document = Some(bytes);
            inner.selection_handle = Some(handle);
            document_updated = true;
        }

        if let Some(page_num) = jump_page {
            self.inner.lock().await.page_num = page_num;
            let _ = self.events.send(SessionEvent::PageChanged(page_num));
        }
        if document_updated {
            let _ = self.events.send(SessionEvent::DocumentUpdated);
        }
        let _ = self.events.send(SessionEvent::SelectionChanged(selection));
        Ok(())
    }

    /// Accepts an issue via the review API, then reflects the confirmed
    /// state in the store. The store is never mutated on failure.
    pub async fn accept_issue(
        &self,
        id: &str,
        modified_fields: Option<ModifiedFields>,
    ) -> Result<Issue> {
        let doc_id = self.require_doc_id().await?;
        let body = match &modified_fields {
            Some(fields) if !fields.is_empty() => Some(serde_json::to_value(fields)?),
            _ => None,
        };

        let response = self
            .transport
            .request(Method::PATCH, &format!("{doc_id}/issues/{id}/accept"), body)
            .await?;
        let updated: Issue =
            serde_json::from_value(response).context("malformed issue in accept response")?;

        {
            let mut inner = self.inner.lock().await;
            inner
                .store
                .set_status(id, IssueStatus::Accepted, modified_fields)?;
            inner.store.update(updated.clone());
        }
        info!(issue_id = %id, "issue accepted");
        Ok(updated)
    }

    pub async fn dismiss_issue(&self, id: &str) -> Result<Issue> {
        let doc_id = self.require_doc_id().await?;

        let response = self
            .transport
            .request(
                Method::PATCH,
                &format!("{doc_id}/issues/{id}/dismiss"),
                None,
            )
            .await?;
        let updated: Issue =
            serde_json::from_value(response).context("malformed issue in dismiss response")?;

        {
            let mut inner = self.inner.lock().await;
            inner.store.set_status(id, IssueStatus::Dismissed, None)?;
            inner.store.update(updated.clone());
        }
        info!(issue_id = %id, "issue dismissed");
        Ok(updated)
    }

    /// Attaches free-text feedback to an already dismissed issue.
    pub async fn submit_feedback(&self, id: &str, reason: &str) -> Result<()> {
        let doc_id = self.require_doc_id().await?;
        let body = serde_json::json!({ "reason": reason });

        self.transport
            .request(
                Method::PATCH,
                &format!("{doc_id}/issues/{id}/feedback"),
                Some(body),
            )
            .await?;

        self.inner.lock().await.store.attach_feedback(id, reason)?;
        Ok(())
    }

    pub async fn check_status(&self) -> CheckStatus {
        let inner = self.inner.lock().await;
        CheckStatus {
            in_progress: inner.check_in_progress,
            complete: inner.check_complete,
            error: inner.check_error.clone(),
        }
    }

    pub async fn current_document(&self) -> Option<Vec<u8>> {
        self.inner.lock().await.document.clone()
    }

    pub async fn selected_issue(&self) -> Option<String> {
        self.inner.lock().await.selected_issue.clone()
    }

    pub async fn page_num(&self) -> u32 {
        self.inner.lock().await.page_num
    }

    pub async fn issue(&self, id: &str) -> Option<Issue> {
        self.inner.lock().await.store.get(id).cloned()
    }

    /// Filtered, display-ordered snapshot of the issue list.
    pub async fn issues_view(
        &self,
        status_filter: &HashSet<IssueStatus>,
        hidden_types: &HashSet<String>,
    ) -> Vec<Issue> {
        let inner = self.inner.lock().await;
        inner
            .store
            .view(status_filter, hidden_types)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Badge count for one issue type, ignoring filters.
    pub async fn count_of_kind(&self, kind: &str) -> usize {
        self.inner.lock().await.store.count_of_kind(kind)
    }

    async fn require_doc_id(&self) -> Result<String> {
        self.inner
            .lock()
            .await
            .doc_id
            .clone()
            .ok_or_else(|| anyhow!("no document loaded"))
    }

    /// Folds one issues batch into the store and draws permanent highlight
    /// markers. The buffer is republished once per batch, not per issue.
    async fn apply_issues(&self, generation: u64, issues: Vec<Issue>) {
        let targets: Vec<(String, u32, Vec<f64>)> = issues
            .iter()
            .filter_map(|issue| {
                issue
                    .location
                    .as_ref()
                    .filter(|location| location.has_bounding_box())
                    .map(|location| {
                        (
                            issue.id.clone(),
                            location.page_num,
                            location.bounding_box.clone(),
                        )
                    })
            })
            .collect();
        let count = issues.len();

        {
            let mut inner = self.inner.lock().await;
            if inner.run_generation != generation {
                // Stale run; its events must not reach the store.
                return;
            }
            inner.store.append(issues);
        }
        let _ = self.events.send(SessionEvent::IssuesAppended { count });

        let mut latest: Option<Vec<u8>> = None;
        for (issue_id, page_num, bounding_box) in &targets {
            match self.overlay.add(*page_num, bounding_box, None).await {
                // Permanent marker; its handle is not tracked.
                Ok((bytes, _handle)) => latest = Some(bytes),
                Err(err) => {
                    warn!(issue_id = %issue_id, error = %err, "failed to draw issue highlight")
                }
            }
        }

        if let Some(bytes) = latest {
            {
                let mut inner = self.inner.lock().await;
                if inner.run_generation != generation {
                    return;
                }
                inner.document = Some(bytes);
            }
            let _ = self.events.send(SessionEvent::DocumentUpdated);
        }
    }

    async fn finish_run(&self, generation: u64, outcome: RunOutcome) {
        let event = {
            let mut inner = self.inner.lock().await;
            if inner.run_generation != generation {
                // Superseded or torn down; the newer owner already set flags.
                return;
            }
            inner.active_run = None;
            match outcome {
                RunOutcome::Completed => {
                    inner.check_in_progress = false;
                    inner.check_complete = true;
                    Some(SessionEvent::CheckCompleted)
                }
                RunOutcome::Failed(message) => {
                    inner.check_in_progress = false;
                    inner.check_error = Some(message.clone());
                    Some(SessionEvent::CheckFailed(message))
                }
                RunOutcome::Aborted => {
                    inner.check_in_progress = false;
                    None
                }
            }
        };
        if let Some(event) = event {
            let _ = self.events.send(event);
        }
    }
}

struct RunSink {
    session: Arc<ReviewSession>,
    generation: u64,
}

#[async_trait]
impl IssueSink for RunSink {
    async fn on_issues(&self, issues: Vec<Issue>) {
        self.session.apply_issues(self.generation, issues).await;
    }
}
