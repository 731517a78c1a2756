use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Access/refresh token pair for one upstream session.
///
/// Owned by the token manager: mutated only by a successful refresh, destroyed
/// on logout or an irrecoverable refresh failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Build a credential from an access/refresh pair and an expiry delta in
    /// seconds, as returned by the upstream token endpoint.
    pub fn from_expires_in(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
    ) -> Self {
        Self::new(
            access_token,
            refresh_token,
            Utc::now() + Duration::seconds(expires_in),
        )
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// True when the credential is already expired or will expire within the
    /// given window.
    pub fn expires_within(&self, window: Duration) -> bool {
        self.expires_at - window <= Utc::now()
    }
}
