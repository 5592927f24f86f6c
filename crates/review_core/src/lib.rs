//! Client core for streaming document review.
//!
//! The session controller opens a long-lived server-sent-event connection,
//! classifies and recovers from transport failures, folds incoming issue
//! events into an ordered store, and keeps an annotation overlay in sync
//! with the issue list and the current selection.

pub mod config;
pub mod error;
pub mod overlay;
pub mod session;
pub mod sse;
pub mod storage;
pub mod store;
pub mod stream;
pub mod transport;

pub use config::{load_settings, Settings};
pub use error::{StoreError, TransportError};
pub use overlay::{AnnotationHandle, AnnotationOverlay, HighlightColor, NoopOverlay};
pub use session::{CheckStatus, ReviewSession, SessionEvent};
pub use storage::{DocumentStore, HttpDocumentStore};
pub use store::IssueStore;
pub use stream::{
    cancellation_pair, CancelHandle, CancelToken, IssueSink, RunOutcome, StreamClient,
    DEFAULT_MAX_RETRIES,
};
pub use transport::{
    HttpTransport, ReviewTransport, SseMessageStream, StaticTokenProvider, TokenProvider,
};

#[cfg(test)]
mod tests;
