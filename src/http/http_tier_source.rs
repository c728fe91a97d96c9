use std::time::Duration;

use crate::{
    GateError, TierDefinition, TierSource,
    http::{
        DEFAULT_HTTP_TIMEOUT, HttpCredentials, build_client, env_or_default, timeout_from_env,
        with_credentials,
    },
};

/// Default tier definition endpoint.
pub const DEFAULT_TIERS_URL: &str = "http://localhost:3054/tiers";

/// Configuration for [`HttpTierSource`].
#[derive(Clone, Debug)]
pub struct HttpTierSourceOptions {
    /// URL tier definitions are fetched from.
    pub endpoint: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<HttpCredentials>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpTierSourceOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_TIERS_URL.to_string(),
            credentials: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl HttpTierSourceOptions {
    /// Read `TIERGATE_TIERS_URL`, `TIERGATE_HTTP_USERNAME`, `TIERGATE_HTTP_PASSWORD`
    /// and `TIERGATE_HTTP_TIMEOUT_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self {
            endpoint: env_or_default("TIERGATE_TIERS_URL", DEFAULT_TIERS_URL),
            credentials: HttpCredentials::from_env(),
            timeout: timeout_from_env(),
        }
    }
}

/// [`TierSource`] reading a JSON object of `tier -> limit` with a GET request.
///
/// A non-200 status, a transport failure or a body that is not such an object all
/// yield [`GateError::ConfigRefreshFailure`].
#[derive(Clone, Debug)]
pub struct HttpTierSource {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<HttpCredentials>,
}

impl HttpTierSource {
    /// Create a tier source.
    pub fn new(options: HttpTierSourceOptions) -> Result<Self, GateError> {
        let client = build_client(options.timeout).map_err(|err| {
            GateError::ConfigRefreshFailure(format!("cannot build http client: {err}"))
        })?;

        Ok(Self {
            client,
            endpoint: options.endpoint,
            credentials: options.credentials,
        })
    }
}

impl TierSource for HttpTierSource {
    async fn fetch_tiers(&self) -> Result<TierDefinition, GateError> {
        let response = with_credentials(self.client.get(&self.endpoint), self.credentials.as_ref())
            .send()
            .await
            .map_err(|err| GateError::ConfigRefreshFailure(err.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(GateError::ConfigRefreshFailure(format!(
                "tier endpoint answered with status {}",
                status.as_u16()
            )));
        }

        let tiers = response.json::<TierDefinition>().await.map_err(|err| {
            GateError::ConfigRefreshFailure(format!("malformed tier definition: {err}"))
        })?;

        tracing::debug!(tier_count = tiers.len(), endpoint = %self.endpoint, "fetched tiers");
        Ok(tiers)
    } // end method fetch_tiers
}
