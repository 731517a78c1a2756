//! Client for the Trenara coaching API.
//!
//! The centerpiece is the authenticated-request coordinator
//! ([`ApiClient`] + [`TokenManager`]): bearer-token calls against a single
//! upstream base URL with transparent, single-flight token refresh. Requests
//! that hit a 401 while a refresh is in flight queue up and are replayed in
//! order once the refresh resolves; a failed refresh invalidates the session
//! and rejects the whole queue.
//!
//! Wiring is explicit, one coordinator per logical session:
//!
//! ```no_run
//! use std::sync::Arc;
//! use trenara_client::{ApiClient, AuthService, Config, MemoryCredentialStore, TokenManager};
//!
//! # async fn wire() {
//! let config = Arc::new(Config::new("https://backend-prod.trenara.com"));
//! let store = Arc::new(MemoryCredentialStore::new());
//! let tokens = Arc::new(TokenManager::new(&config, store));
//! let client = ApiClient::new(config, tokens.clone());
//! let auth = AuthService::new(client.clone(), tokens);
//! # }
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::auth::{AuthService, LoginRequest, RefreshTokenRequest, TokenManager, TokenResponse};
pub use domain::credential::{Credential, CredentialStore, MemoryCredentialStore};
pub use error::{ApiError, ApiResult};
pub use infrastructure::config::{Config, Environment, LogFormat};
pub use infrastructure::http::{ApiClient, ForwardedIdentity, RequestOptions, UpstreamResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging for a host binary. Call once at startup.
pub fn init_logging(config: &Config) {
    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "trenara_client=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "trenara_client=debug".into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
