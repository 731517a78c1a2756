use std::sync::Arc;

use super::{LoginRequest, TokenManager, TokenResponse};
use crate::{
    error::{ApiError, ApiResult},
    infrastructure::http::{ApiClient, RequestOptions},
};

/// Session bootstrap against the upstream: login, logout, proactive token
/// upkeep. One instance per logical session context, wired with the same
/// token manager the client uses.
pub struct AuthService {
    client: ApiClient,
    tokens: Arc<TokenManager>,
}

impl AuthService {
    pub fn new(client: ApiClient, tokens: Arc<TokenManager>) -> Self {
        Self { client, tokens }
    }

    /// Authenticate with email/password and store the issued token pair.
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<()> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let tokens: TokenResponse = self
            .client
            .post("/login", Some(&request), RequestOptions::anonymous())
            .await?;

        self.tokens.install(&tokens).await;
        tracing::info!("session established");
        Ok(())
    }

    /// End the session. The upstream is notified best-effort; the local
    /// credential is always cleared.
    pub async fn logout(&self) -> ApiResult<()> {
        let result: ApiResult<()> = self
            .client
            .post("/logout", None::<&()>, RequestOptions::default())
            .await;

        self.tokens.clear().await;

        match result {
            // An already-dead session upstream is still a successful logout.
            Err(ApiError::AuthenticationFailed(_)) | Ok(()) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Whether a credential is currently stored.
    pub async fn has_session(&self) -> bool {
        self.tokens.credential().await.is_some()
    }

    /// Proactively refresh a near-expiry credential. Returns whether a usable
    /// credential is in place.
    pub async fn ensure_fresh(&self) -> bool {
        self.tokens.validate_and_refresh().await
    }
}
