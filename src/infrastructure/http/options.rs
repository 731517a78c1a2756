use std::time::Duration;

/// Opaque session identity forwarded verbatim to the upstream as a `Cookie`
/// header, for server-side calls made on behalf of a browser session. The
/// client never inspects or rewrites it, and it rides along unchanged when a
/// request is replayed after a token refresh.
#[derive(Debug, Clone)]
pub struct ForwardedIdentity(String);

impl ForwardedIdentity {
    pub fn new(cookie_header: impl Into<String>) -> Self {
        Self(cookie_header.into())
    }

    /// Build from individual cookie pairs.
    pub fn from_cookies<'a>(cookies: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let header = cookies
            .into_iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        Self(header)
    }

    pub fn as_header_value(&self) -> &str {
        &self.0
    }
}

/// Per-request knobs for the API client.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    /// Budget for the whole call, including time spent queued behind a token
    /// refresh. Falls back to the configured default.
    pub timeout: Option<Duration>,
    /// Extra attempts for network/5xx failures. Falls back to the configured
    /// default.
    pub retries: Option<u32>,
    pub forwarded_identity: Option<ForwardedIdentity>,
    /// Skip bearer authentication (login and other anonymous endpoints).
    pub skip_auth: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for endpoints that take no bearer token.
    pub fn anonymous() -> Self {
        Self {
            skip_auth: true,
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn forwarded_identity(mut self, identity: ForwardedIdentity) -> Self {
        self.forwarded_identity = Some(identity);
        self
    }
}
