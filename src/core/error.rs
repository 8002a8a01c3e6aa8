use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Why a request to the dashboard backend did not yield usable data
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Network failure, timeout, or an HTTP error without a readable payload
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend answered with an `error` or `message` payload
    #[error("{0}")]
    Logical(String),
    /// The payload was missing expected fields
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Classify a decoded response body
///
/// An `error` or `message` field wins over any data fields; otherwise the body
/// must deserialize into `T`.
pub fn parse_reply<T: DeserializeOwned>(body: Value) -> FetchResult<T> {
    if let Some(text) = payload_text(&body, "error").or_else(|| payload_text(&body, "message")) {
        return Err(FetchError::Logical(text));
    }
    serde_json::from_value(body).map_err(|e| FetchError::Malformed(e.to_string()))
}

/// Text of a top-level string-ish field, if present
pub(crate) fn payload_text(body: &Value, key: &str) -> Option<String> {
    match body.as_object()?.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
