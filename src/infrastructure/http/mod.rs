pub mod options;
pub mod response;

pub use options::{ForwardedIdentity, RequestOptions};
pub use response::UpstreamResponse;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::domain::auth::TokenManager;
use crate::error::{ApiError, ApiResult};
use crate::infrastructure::config::Config;

/// Client for the upstream coaching API.
///
/// All calls are constrained to the configured base URL and carry a bearer
/// token from the session's credential store. When the upstream signals an
/// expired token (401), the client refreshes it transparently: the first
/// request to observe the 401 starts the single refresh, every request
/// failing in the same window queues behind it, and once the refresh
/// resolves the queue is drained atomically — replayed in FIFO order on
/// success, rejected uniformly on failure. One refresh network call per
/// storm, never more.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<Config>,
    tokens: Arc<TokenManager>,
    gate: Arc<Mutex<RefreshGate>>,
}

/// Shared refresh state: the in-flight flag plus the queue of requests
/// blocked behind the refresh. Append while refreshing, drain-and-clear
/// exactly once when the refresh resolves.
#[derive(Default)]
struct RefreshGate {
    refreshing: bool,
    queue: Vec<PendingRequest>,
}

/// A request parked while a token refresh is in flight.
struct PendingRequest {
    request: PreparedRequest,
    responder: oneshot::Sender<ApiResult<UpstreamResponse>>,
}

/// Fully prepared outbound call, cloneable so it can be retried and replayed
/// byte-for-byte (same request id, same forwarded identity).
#[derive(Debug, Clone)]
struct PreparedRequest {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    params: Vec<(String, String)>,
    body: Option<Value>,
    forwarded_identity: Option<String>,
    skip_auth: bool,
    request_id: String,
}

impl ApiClient {
    pub fn new(config: Arc<Config>, tokens: Arc<TokenManager>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            tokens,
            gate: Arc::new(Mutex::new(RefreshGate::default())),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::GET, path, None::<&()>, options).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::POST, path, body, options).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::PUT, path, body, options).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::PATCH, path, body, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> ApiResult<T> {
        self.request(Method::DELETE, path, None::<&()>, options)
            .await
    }

    /// Core request method: prepares the call, applies the overall timeout
    /// budget and the retry policy, then decodes the response body.
    pub async fn request<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> ApiResult<T> {
        let prepared = self.prepare(method, path, body, &options)?;
        let retries = options.retries.unwrap_or(self.config.max_retries);
        let budget = options
            .timeout
            .unwrap_or(Duration::from_secs(self.config.request_timeout_secs));

        let response = match tokio::time::timeout(budget, self.execute_with_retry(prepared, retries))
            .await
        {
            Ok(result) => result?,
            // The call's own budget elapsed; any queued entry it left behind
            // is skipped on replay because its receiver is gone.
            Err(_) => return Err(ApiError::Timeout(budget.as_millis() as u64)),
        };

        response.json()
    }

    fn prepare<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: &RequestOptions,
    ) -> ApiResult<PreparedRequest> {
        let base = self.config.base_url.trim_end_matches('/');
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            if !path.starts_with(base) {
                return Err(ApiError::Internal(format!(
                    "request URL outside the configured upstream: {}",
                    path
                )));
            }
            path.to_string()
        } else {
            format!("{}{}", base, path)
        };

        let body = match body {
            Some(body) => Some(
                serde_json::to_value(body)
                    .map_err(|err| ApiError::Internal(format!("unserializable body: {}", err)))?,
            ),
            None => None,
        };

        Ok(PreparedRequest {
            method,
            url,
            headers: options.headers.clone(),
            params: options.params.clone(),
            body,
            forwarded_identity: options
                .forwarded_identity
                .as_ref()
                .map(|identity| identity.as_header_value().to_string()),
            skip_auth: options.skip_auth,
            request_id: Uuid::new_v4().to_string(),
        })
    }

    /// Retry loop for transient failures: network errors and 5xx responses,
    /// with exponential backoff. Auth, permission and validation errors
    /// propagate on first occurrence.
    async fn execute_with_retry(
        &self,
        prepared: PreparedRequest,
        retries: u32,
    ) -> ApiResult<UpstreamResponse> {
        let mut attempt: u32 = 0;
        loop {
            match self.execute(prepared.clone()).await {
                Err(err) if err.is_retryable() && attempt < retries => {
                    let delay = Duration::from_millis(
                        self.config
                            .retry_base_delay_ms
                            .saturating_mul(1u64 << attempt.min(16)),
                    );
                    tracing::debug!(
                        request_id = %prepared.request_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying upstream request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// One attempt against the upstream, resolving 401s through the refresh
    /// queue.
    async fn execute(&self, prepared: PreparedRequest) -> ApiResult<UpstreamResponse> {
        let response = self.send_once(&prepared).await?;

        if response.status.is_success() {
            return Ok(response);
        }

        if response.status == StatusCode::UNAUTHORIZED && !prepared.skip_auth {
            tracing::debug!(
                request_id = %prepared.request_id,
                url = %prepared.url,
                "unauthorized response, entering refresh queue"
            );
            return self.wait_for_refresh(prepared).await;
        }

        Err(ApiError::from_status(
            response.status.as_u16(),
            &response.body,
        ))
    }

    /// One attempt with no refresh handling, for requests replayed after a
    /// refresh: a storm gets exactly one refresh, so a second 401 here is
    /// terminal.
    async fn replay(&self, prepared: PreparedRequest) -> ApiResult<UpstreamResponse> {
        let response = self.send_once(&prepared).await?;

        if response.status.is_success() {
            return Ok(response);
        }

        Err(ApiError::from_status(
            response.status.as_u16(),
            &response.body,
        ))
    }

    async fn send_once(&self, prepared: &PreparedRequest) -> ApiResult<UpstreamResponse> {
        let mut builder = self
            .http
            .request(prepared.method.clone(), prepared.url.as_str())
            .header("x-request-id", prepared.request_id.as_str());

        if !prepared.params.is_empty() {
            builder = builder.query(&prepared.params);
        }
        for (name, value) in &prepared.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(identity) = &prepared.forwarded_identity {
            builder = builder.header(header::COOKIE, identity.as_str());
        }

        if !prepared.skip_auth {
            let Some(credential) = self.tokens.credential().await else {
                // No credential at all: fail fast, never attempt a refresh.
                return Err(ApiError::AuthenticationFailed(
                    "no credential present, please log in".to_string(),
                ));
            };
            builder = builder.bearer_auth(&credential.access_token);
        }

        if let Some(body) = &prepared.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        Ok(UpstreamResponse { status, body })
    }

    /// Park this request behind the in-flight refresh, starting one if the
    /// gate is idle. The first caller to trip the gate owns starting the
    /// refresh cycle; everyone else only enqueues.
    async fn wait_for_refresh(&self, prepared: PreparedRequest) -> ApiResult<UpstreamResponse> {
        let (responder, outcome) = oneshot::channel();

        let starts_refresh = {
            let mut gate = self.gate.lock().await;
            gate.queue.push(PendingRequest {
                request: prepared,
                responder,
            });
            !std::mem::replace(&mut gate.refreshing, true)
        };

        if starts_refresh {
            let client = self.clone();
            tokio::spawn(async move { client.run_refresh_cycle().await });
        }

        match outcome.await {
            Ok(result) => result,
            Err(_) => Err(ApiError::AuthenticationFailed(
                "token refresh was abandoned".to_string(),
            )),
        }
    }

    /// Resolve one refresh storm: perform the single refresh, then drain the
    /// queue atomically. On success the queued requests are replayed in FIFO
    /// order, each resolving on its own replay outcome; on failure all are
    /// rejected uniformly and the credential is already cleared.
    async fn run_refresh_cycle(&self) {
        let refreshed = self.tokens.refresh().await;

        let drained = {
            let mut gate = self.gate.lock().await;
            gate.refreshing = false;
            std::mem::take(&mut gate.queue)
        };

        tracing::debug!(
            refreshed,
            pending = drained.len(),
            "token refresh cycle resolved"
        );

        if refreshed {
            for pending in drained {
                // Caller gave up (timed out); its slot was already removed.
                if pending.responder.is_closed() {
                    continue;
                }
                let result = self.replay(pending.request).await;
                let _ = pending.responder.send(result);
            }
        } else {
            for pending in drained {
                let _ = pending.responder.send(Err(ApiError::AuthenticationFailed(
                    "token refresh failed, please log in again".to_string(),
                )));
            }
        }
    }
}
