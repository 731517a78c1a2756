use std::collections::HashMap;

use serde::Deserialize;

/// Main error type for calls against the upstream API.
///
/// 401 responses are resolved inside the client (via token refresh) whenever
/// possible; every other kind is surfaced to the caller unchanged, with enough
/// structure (status code, optional field errors) to decide on user-facing
/// messaging.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("network request failed: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("invalid input: {message}")]
    Validation {
        message: String,
        errors: Option<HashMap<String, Vec<String>>>,
    },

    #[error("upstream server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("request timed out after {0}ms")]
    Timeout(u64),

    #[error("unexpected upstream response ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("failed to decode upstream response: {0}")]
    Decode(String),

    #[error("internal client error: {0}")]
    Internal(String),
}

/// Error body shape the upstream uses for non-2xx responses.
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    message: Option<String>,
    errors: Option<HashMap<String, Vec<String>>>,
}

impl ApiError {
    /// HTTP status code this error was classified from, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed(_) => Some(401),
            Self::Forbidden(_) => Some(403),
            Self::Validation { .. } => Some(422),
            Self::Server { status, .. } | Self::Upstream { status, .. } => Some(*status),
            Self::Network(_) | Self::Timeout(_) | Self::Decode(_) | Self::Internal(_) => None,
        }
    }

    /// Whether the caller's retry policy may retry this error.
    ///
    /// Only transport failures and 5xx responses qualify; auth, permission and
    /// validation errors propagate on first occurrence.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }

    /// Field-level validation detail, when the upstream provided any.
    pub fn field_errors(&self) -> Option<&HashMap<String, Vec<String>>> {
        match self {
            Self::Validation { errors, .. } => errors.as_ref(),
            _ => None,
        }
    }

    /// Classify a non-2xx upstream response into a typed error.
    ///
    /// The body is parsed as the upstream's `{message, errors}` shape when
    /// possible; otherwise the raw status text stands in.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let parsed: Option<UpstreamErrorBody> = serde_json::from_slice(body).ok();
        let message = parsed
            .as_ref()
            .and_then(|b| b.message.clone())
            .unwrap_or_else(|| {
                if body.is_empty() {
                    "no response body".to_string()
                } else {
                    String::from_utf8_lossy(body).into_owned()
                }
            });

        match status {
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            400 | 422 => Self::Validation {
                message,
                errors: parsed.and_then(|b| b.errors),
            },
            500..=599 => Self::Server { status, message },
            _ => Self::Upstream { status, message },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            // Transport-level timeouts land here too: the overall budget is
            // enforced (and reported) one level up, so at this level they are
            // just retryable transport failures.
            Self::Network(err.to_string())
        }
    }
}

/// Custom result type for upstream calls
pub type ApiResult<T> = Result<T, ApiError>;
