/// Session client configuration
use std::time::Duration;

/// Base URL used when neither an explicit value nor `FARMCERT_API_URL` is given
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Lifetime of each persisted session entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTtl {
    pub access_token: Duration,
    pub refresh_token: Duration,
    pub user: Duration,
}

impl Default for SessionTtl {
    fn default() -> Self {
        Self {
            access_token: Duration::from_secs(24 * 3600),
            refresh_token: Duration::from_secs(7 * 24 * 3600),
            user: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// Client configuration, resolved once before the client is built
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root including the `/api` prefix, without trailing slash
    pub base_url: String,
    pub ttl: SessionTtl,
    /// Whole-request timeout; `None` leaves requests unbounded
    pub timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl: SessionTtl::default(),
            timeout: None,
        }
    }

    /// Explicit value, else `FARMCERT_API_URL`, else [`DEFAULT_API_URL`]
    pub fn resolve(explicit: Option<&str>) -> Self {
        let base_url = explicit
            .map(str::to_string)
            .or_else(|| {
                std::env::var("FARMCERT_API_URL")
                    .ok()
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self::new(base_url)
    }

    pub fn with_ttl(mut self, ttl: SessionTtl) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Absolute URL for an API path such as `/farmers/me`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
