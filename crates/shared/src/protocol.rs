use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Issue;

/// One server-sent event as it arrives off the wire: the `event:` field and
/// the concatenated `data:` lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SseMessage {
    pub event: String,
    pub data: String,
}

/// Typed events produced by the review endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewEvent {
    Issues(Vec<Issue>),
    Error(String),
    Complete,
    Unknown(String),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed '{event}' payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ReviewEvent {
    /// Classifies a raw wire message. Unrecognized kinds come back as
    /// `Unknown`; whether that is tolerated is the caller's call.
    pub fn parse(msg: &SseMessage) -> Result<Self, ProtocolError> {
        match msg.event.as_str() {
            "issues" => {
                // The server omits the data line entirely for an empty batch.
                if msg.data.trim().is_empty() {
                    return Ok(ReviewEvent::Issues(Vec::new()));
                }
                let issues =
                    serde_json::from_str(&msg.data).map_err(|source| ProtocolError::Payload {
                        event: msg.event.clone(),
                        source,
                    })?;
                Ok(ReviewEvent::Issues(issues))
            }
            "error" => Ok(ReviewEvent::Error(msg.data.clone())),
            "complete" => Ok(ReviewEvent::Complete),
            other => Ok(ReviewEvent::Unknown(other.to_string())),
        }
    }
}
