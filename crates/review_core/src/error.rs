use shared::domain::IssueStatus;
use thiserror::Error;

/// Failures raised by the review transport, at stream open time, while the
/// stream is live, or for accept/dismiss/feedback requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Service unavailable before any event was delivered; safe to retry.
    #[error("{0}")]
    Retriable(String),
    /// Non-retriable server or application failure.
    #[error("{0}")]
    Fatal(String),
    /// The caller cancelled; never surfaced to the user as a failure.
    #[error("stream aborted")]
    Aborted,
    /// Wire event kind outside the protocol. Fail closed.
    #[error("Unexpected event type: {0}")]
    UnknownEvent(String),
}

impl TransportError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, TransportError::Retriable(_))
    }
}

/// Sequencing misuse of the issue store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("invalid status transition {from:?} -> {to:?}")]
    InvalidTransition { from: IssueStatus, to: IssueStatus },
    #[error("feedback requires a dismissed issue, current status is {status:?}")]
    InvalidState { status: IssueStatus },
    #[error("unknown issue id '{0}'")]
    UnknownIssue(String),
}
