//! Annotation overlay collaborator contract.
//!
//! The overlay burns visual highlight boxes into a document's byte
//! representation and hands back opaque handles for later removal. Value in,
//! value out; the session owns the current buffer.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Opaque identifier for one drawn highlight.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationHandle(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl HighlightColor {
    /// Emphasis color for the currently selected issue.
    pub const SELECTION: HighlightColor = HighlightColor { r: 255, g: 0, b: 0 };
}

#[async_trait]
pub trait AnnotationOverlay: Send + Sync {
    /// Prepares a freshly loaded document for annotation and returns the
    /// (possibly rewritten) buffer.
    async fn init(&self, document: Vec<u8>) -> Result<Vec<u8>>;

    /// Draws one highlight box; returns the updated buffer and a handle for
    /// later removal. Page numbers start at 1.
    async fn add(
        &self,
        page_num: u32,
        bounding_box: &[f64],
        color: Option<HighlightColor>,
    ) -> Result<(Vec<u8>, AnnotationHandle)>;

    /// Removes a previously drawn highlight and returns the updated buffer.
    async fn delete(&self, handle: &AnnotationHandle) -> Result<Vec<u8>>;
}

/// Pass-through overlay for deployments without a renderer: the buffer is
/// returned untouched and handles are synthetic.
#[derive(Debug, Default)]
pub struct NoopOverlay {
    document: Mutex<Vec<u8>>,
    next_handle: AtomicU64,
}

impl NoopOverlay {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AnnotationOverlay for NoopOverlay {
    async fn init(&self, document: Vec<u8>) -> Result<Vec<u8>> {
        let mut current = self.document.lock().await;
        *current = document.clone();
        Ok(document)
    }

    async fn add(
        &self,
        _page_num: u32,
        _bounding_box: &[f64],
        _color: Option<HighlightColor>,
    ) -> Result<(Vec<u8>, AnnotationHandle)> {
        let id = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let document = self.document.lock().await.clone();
        Ok((document, AnnotationHandle(format!("noop-{id}"))))
    }

    async fn delete(&self, _handle: &AnnotationHandle) -> Result<Vec<u8>> {
        Ok(self.document.lock().await.clone())
    }
}
