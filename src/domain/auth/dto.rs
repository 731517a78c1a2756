use serde::{Deserialize, Serialize};

/// Token payload returned by the upstream `/oauth/token` and `/login`
/// endpoints. `expires_in` is an expiry delta in seconds.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Refresh token request
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub grant_type: String,
    pub refresh_token: String,
}

impl RefreshTokenRequest {
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            grant_type: "refresh_token".to_string(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Credentials-based login request
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}
