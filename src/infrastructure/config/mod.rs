use serde::Deserialize;
use std::env;

/// Default production upstream.
const DEFAULT_BASE_URL: &str = "https://backend-prod.trenara.com";

/// Refresh the credential once it is within this window of expiring (12h).
const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 43_200;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the upstream coaching API. All requests are constrained
    /// to this host.
    pub base_url: String,
    /// Default per-request budget, including any time spent queued behind an
    /// in-flight token refresh. Overridable per request.
    pub request_timeout_secs: u64,
    /// Default number of extra attempts for network/5xx failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retry attempts.
    pub retry_base_delay_ms: u64,
    /// Proactive-refresh window: credentials expiring within this many
    /// seconds are refreshed before use.
    pub refresh_threshold_secs: i64,
    pub environment: Environment,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let config = Config {
            base_url: env::var("TRENARA_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            request_timeout_secs: env::var("TRENARA_REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            max_retries: env::var("TRENARA_MAX_RETRIES")
                .unwrap_or_else(|_| "0".to_string())
                .parse()?,
            retry_base_delay_ms: env::var("TRENARA_RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()?,
            refresh_threshold_secs: env::var("TRENARA_REFRESH_THRESHOLD_SECS")
                .unwrap_or_else(|_| DEFAULT_REFRESH_THRESHOLD_SECS.to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "production" => Environment::Production,
                    _ => Environment::Development,
                })?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                })?,
        };

        Ok(config)
    }

    /// Configuration with defaults for a given upstream, for embedding the
    /// client without environment plumbing.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_secs: 30,
            max_retries: 0,
            retry_base_delay_ms: 1000,
            refresh_threshold_secs: DEFAULT_REFRESH_THRESHOLD_SECS,
            environment: Environment::Development,
            log_format: LogFormat::Pretty,
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Well-known token-refresh endpoint on the upstream.
    pub fn refresh_url(&self) -> String {
        format!("{}/oauth/token", self.base_url.trim_end_matches('/'))
    }
}
