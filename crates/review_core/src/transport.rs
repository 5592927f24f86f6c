//! Authenticated HTTP/SSE transport to the review API.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{header, Client, Method, Response, StatusCode};
use shared::{error::response_error_message, protocol::SseMessage};
use tracing::debug;
use url::Url;

use crate::error::TransportError;
use crate::sse::SseDecoder;

pub type SseMessageStream = BoxStream<'static, Result<SseMessage, TransportError>>;

/// Source of bearer tokens for the review API. Acquisition/refresh mechanics
/// live behind this seam.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// Transport contract consumed by the stream client and the session's
/// accept/dismiss/feedback actions.
#[async_trait]
pub trait ReviewTransport: Send + Sync {
    /// Opens a server-sent event stream. A 503 response maps to
    /// `Retriable`, any other non-success response to `Fatal`.
    async fn open_stream(&self, path: &str) -> Result<SseMessageStream, TransportError>;

    /// Plain request/response call with the same status classification.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError>;
}

pub struct HttpTransport {
    http: Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl HttpTransport {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        Ok(Self {
            http: Client::new(),
            base_url,
            tokens,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|err| TransportError::Fatal(format!("invalid API path '{path}': {err}")))
    }

    async fn bearer_token(&self) -> Result<String, TransportError> {
        self.tokens
            .access_token()
            .await
            .map_err(|err| TransportError::Fatal(format!("failed to acquire access token: {err}")))
    }
}

/// Maps a non-success open/request response to the error taxonomy, consuming
/// the body for the message.
async fn classify_failure(response: Response) -> TransportError {
    let status = response.status();
    let status_text = status.canonical_reason().unwrap_or("unknown status");
    let body = response.text().await.unwrap_or_default();
    let message = response_error_message(status_text, &body);

    if status == StatusCode::SERVICE_UNAVAILABLE {
        TransportError::Retriable(message)
    } else {
        TransportError::Fatal(message)
    }
}

#[async_trait]
impl ReviewTransport for HttpTransport {
    async fn open_stream(&self, path: &str) -> Result<SseMessageStream, TransportError> {
        let url = self.endpoint(path)?;
        let token = self.bearer_token().await?;

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token)
            .header(header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|err| TransportError::Fatal(format!("failed to open stream: {err}")))?;

        if !response.status().is_success() {
            return Err(classify_failure(response).await);
        }
        debug!(%url, "stream opened");

        let bytes = response.bytes_stream();
        let stream = futures::stream::unfold(
            (bytes, SseDecoder::new(), VecDeque::new()),
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    if let Some(msg) = pending.pop_front() {
                        return Some((Ok(msg), (bytes, decoder, pending)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.feed(&chunk)),
                        Some(Err(err)) => {
                            let err =
                                TransportError::Fatal(format!("stream transport failure: {err}"));
                            return Some((Err(err), (bytes, decoder, pending)));
                        }
                        None => return None,
                    }
                }
            },
        );

        Ok(stream.boxed())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, TransportError> {
        let url = self.endpoint(path)?;
        let token = self.bearer_token().await?;

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Fatal(format!("request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(classify_failure(response).await);
        }

        let text = response
            .text()
            .await
            .map_err(|err| TransportError::Fatal(format!("failed to read response: {err}")))?;
        if text.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|err| TransportError::Fatal(format!("malformed response body: {err}")))
    }
}
