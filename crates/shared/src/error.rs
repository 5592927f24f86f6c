use serde::{Deserialize, Serialize};

const UNKNOWN_ERROR: &str = "an unknown error occurred. Please try again.";

/// Error payload shape returned by the review API. FastAPI-style bodies carry
/// `detail` (string or structured); others carry `message`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Builds a user-facing message from a non-success response body.
pub fn response_error_message(status_text: &str, body: &str) -> String {
    let mut message = format!("API error ({status_text}): ");

    let detail = if body.is_empty() {
        None
    } else {
        serde_json::from_str::<ApiErrorBody>(body).ok()
    };

    match detail {
        Some(ApiErrorBody {
            detail: Some(serde_json::Value::String(text)),
            ..
        }) => message.push_str(&text),
        Some(ApiErrorBody {
            detail: Some(value),
            ..
        }) => message.push_str(&value.to_string()),
        Some(ApiErrorBody {
            message: Some(text),
            ..
        }) => message.push_str(&text),
        _ => message.push_str(UNKNOWN_ERROR),
    }

    message
}
