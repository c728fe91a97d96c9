//! HTTP adapters over [`reqwest`].
//!
//! - [`HttpForwarder`] POSTs admitted payloads to the downstream endpoint.
//! - [`HttpTierSource`] GETs tier definitions from the configuration endpoint.
//!
//! Both accept optional basic-auth credentials and a request timeout, and can be
//! configured from `TIERGATE_*` environment variables.

use std::{env, time::Duration};

mod http_forwarder;
pub use http_forwarder::*;

mod http_tier_source;
pub use http_tier_source::*;

/// Default request timeout of the HTTP adapters.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Basic-auth credentials sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpCredentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

impl std::fmt::Debug for HttpCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl HttpCredentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Read `TIERGATE_HTTP_USERNAME` / `TIERGATE_HTTP_PASSWORD`, `None` unless the user
    /// name is set.
    pub fn from_env() -> Option<Self> {
        let username = env_non_empty("TIERGATE_HTTP_USERNAME")?;
        let password = env_non_empty("TIERGATE_HTTP_PASSWORD").unwrap_or_default();

        Some(Self { username, password })
    }
}

pub(crate) fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

pub(crate) fn env_or_default(key: &str, fallback: &str) -> String {
    env_non_empty(key).unwrap_or_else(|| fallback.to_string())
}

pub(crate) fn timeout_from_env() -> Duration {
    env_non_empty("TIERGATE_HTTP_TIMEOUT_MS")
        .and_then(|ms| ms.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT)
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

pub(crate) fn with_credentials(
    request: reqwest::RequestBuilder,
    credentials: Option<&HttpCredentials>,
) -> reqwest::RequestBuilder {
    match credentials {
        Some(credentials) => {
            request.basic_auth(&credentials.username, Some(&credentials.password))
        }
        None => request,
    }
}
