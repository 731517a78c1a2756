use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};

/// Raw upstream response, captured before JSON decoding so queued requests
/// can be resolved without knowing their caller's target type.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl UpstreamResponse {
    /// Decode the body as JSON. Empty bodies (204 No Content and friends)
    /// decode as `null`, so `()` and `Option<T>` targets work.
    pub fn json<T: DeserializeOwned>(&self) -> ApiResult<T> {
        let raw: &[u8] = if self.body.is_empty() {
            b"null"
        } else {
            &self.body
        };
        serde_json::from_slice(raw).map_err(|err| ApiError::Decode(err.to_string()))
    }
}
