use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{watch, Mutex};

use super::dto::{RefreshTokenRequest, TokenResponse};
use crate::domain::credential::{Credential, CredentialStore};
use crate::infrastructure::config::Config;

/// Owns the credential lifecycle for one upstream session.
///
/// The refresh itself is single-flight: however many callers ask for a
/// refresh while one is already running, exactly one network call to the
/// token endpoint is issued and every caller observes that call's outcome.
/// The flight runs in its own task, so a caller abandoning its wait (timeout,
/// dropped connection) never aborts the refresh for everyone else.
/// A failed refresh (non-2xx or transport error) invalidates the stored
/// credential; the caller must re-authenticate. The refresh call is never
/// retried within the same flight, to avoid refresh-loop amplification.
pub struct TokenManager {
    store: Arc<dyn CredentialStore>,
    http: reqwest::Client,
    refresh_url: String,
    refresh_threshold: Duration,
    flight: Arc<Mutex<Option<watch::Receiver<Option<bool>>>>>,
}

impl TokenManager {
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            store,
            http: reqwest::Client::new(),
            refresh_url: config.refresh_url(),
            refresh_threshold: Duration::seconds(config.refresh_threshold_secs),
            flight: Arc::new(Mutex::new(None)),
        }
    }

    /// Current credential, if a session is active.
    pub async fn credential(&self) -> Option<Credential> {
        self.store.get().await
    }

    /// Install a freshly issued token pair (after login).
    pub async fn install(&self, tokens: &TokenResponse) {
        self.store
            .set(Credential::from_expires_in(
                tokens.access_token.clone(),
                tokens.refresh_token.clone(),
                tokens.expires_in,
            ))
            .await;
    }

    /// Drop the credential (logout).
    pub async fn clear(&self) {
        self.store.clear().await;
    }

    /// Refresh the credential if it is missing-soon: already expired or
    /// expiring within the configured threshold. Returns whether a usable
    /// credential is in place afterwards.
    pub async fn validate_and_refresh(&self) -> bool {
        let Some(credential) = self.store.get().await else {
            return false;
        };

        if credential.expires_within(self.refresh_threshold) {
            return self.refresh().await;
        }

        true
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// Returns `true` when the credential was rotated, `false` when it could
    /// not be and has been cleared. Concurrent calls share a single flight;
    /// every caller, the one who started the flight included, only waits on
    /// its outcome.
    pub async fn refresh(&self) -> bool {
        let mut rx = {
            let mut flight = self.flight.lock().await;
            match flight.as_ref() {
                Some(rx) => rx.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *flight = Some(rx.clone());

                    let store = self.store.clone();
                    let http = self.http.clone();
                    let url = self.refresh_url.clone();
                    let slot = self.flight.clone();
                    tokio::spawn(async move {
                        let outcome = Self::execute_refresh(&store, &http, &url).await;
                        // Close the flight before publishing so a late caller
                        // starts a fresh one instead of observing a stale
                        // outcome.
                        *slot.lock().await = None;
                        let _ = tx.send(Some(outcome));
                    });
                    rx
                }
            }
        };

        loop {
            if let Some(outcome) = *rx.borrow() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return false;
            }
        }
    }

    async fn execute_refresh(
        store: &Arc<dyn CredentialStore>,
        http: &reqwest::Client,
        refresh_url: &str,
    ) -> bool {
        let Some(credential) = store.get().await else {
            tracing::warn!("token refresh requested with no stored credential");
            return false;
        };

        if credential.refresh_token.is_empty() {
            tracing::warn!("stored credential has no refresh token");
            store.clear().await;
            return false;
        }

        tracing::debug!(url = %refresh_url, "issuing token refresh");

        let request = RefreshTokenRequest::new(credential.refresh_token);
        let response = match http.post(refresh_url).json(&request).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!(error = %err, "token refresh network error");
                store.clear().await;
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(
                status = %response.status(),
                "token refresh rejected by upstream, session requires re-authentication"
            );
            store.clear().await;
            return false;
        }

        match response.json::<TokenResponse>().await {
            Ok(tokens) => {
                store
                    .set(Credential::from_expires_in(
                        tokens.access_token,
                        tokens.refresh_token,
                        tokens.expires_in,
                    ))
                    .await;
                tracing::debug!(expires_in = tokens.expires_in, "access token rotated");
                true
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to parse token refresh response");
                store.clear().await;
                false
            }
        }
    }
}
