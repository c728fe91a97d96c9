use std::time::Duration;

use crate::{
    AdmissionRequest, Forwarder, GateError,
    http::{
        DEFAULT_HTTP_TIMEOUT, HttpCredentials, build_client, env_or_default, timeout_from_env,
        with_credentials,
    },
};

/// Default downstream endpoint.
pub const DEFAULT_FORWARD_URL: &str = "http://localhost:3054/my-llm";

/// Configuration for [`HttpForwarder`].
#[derive(Clone, Debug)]
pub struct HttpForwarderOptions {
    /// URL admitted payloads are POSTed to.
    pub endpoint: String,
    /// Optional basic-auth credentials.
    pub credentials: Option<HttpCredentials>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpForwarderOptions {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_FORWARD_URL.to_string(),
            credentials: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

impl HttpForwarderOptions {
    /// Read `TIERGATE_FORWARD_URL`, `TIERGATE_HTTP_USERNAME`, `TIERGATE_HTTP_PASSWORD`
    /// and `TIERGATE_HTTP_TIMEOUT_MS`, falling back to the defaults.
    pub fn from_env() -> Self {
        Self {
            endpoint: env_or_default("TIERGATE_FORWARD_URL", DEFAULT_FORWARD_URL),
            credentials: HttpCredentials::from_env(),
            timeout: timeout_from_env(),
        }
    }
}

/// [`Forwarder`] POSTing the payload as JSON.
///
/// Only a `200 OK` answer counts as success. Any other status becomes
/// [`GateError::DownstreamError`] and a transport failure becomes
/// [`GateError::DownstreamUnavailable`]; neither is retried.
#[derive(Clone, Debug)]
pub struct HttpForwarder {
    client: reqwest::Client,
    endpoint: String,
    credentials: Option<HttpCredentials>,
}

impl HttpForwarder {
    /// Create a forwarder.
    pub fn new(options: HttpForwarderOptions) -> Result<Self, GateError> {
        let client = build_client(options.timeout).map_err(|err| {
            GateError::DownstreamUnavailable(format!("cannot build http client: {err}"))
        })?;

        Ok(Self {
            client,
            endpoint: options.endpoint,
            credentials: options.credentials,
        })
    }

    /// Endpoint payloads are sent to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Forwarder for HttpForwarder {
    async fn forward(&self, request: AdmissionRequest) -> Result<(), GateError> {
        let payload = request.into_payload();

        let response = with_credentials(
            self.client.post(&self.endpoint).json(&payload),
            self.credentials.as_ref(),
        )
        .send()
        .await
        .map_err(|err| GateError::DownstreamUnavailable(err.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(GateError::DownstreamError(status.as_u16()));
        }

        Ok(())
    } // end method forward
}
