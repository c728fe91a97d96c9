use std::future::Future;

use tokio::sync::RwLock;

use crate::{AdmissionRequest, GateError, TierDefinition};

/// Delivers admitted requests to the downstream endpoint.
///
/// Implementations send [`AdmissionRequest::into_payload`], i.e. the document without
/// its identity field, and map any non-200 answer to [`GateError::DownstreamError`].
/// Forwarding is attempted exactly once per admitted request; there is no retry.
pub trait Forwarder: Send + Sync + 'static {
    /// Send the payload of `request` downstream.
    fn forward(
        &self,
        request: AdmissionRequest,
    ) -> impl Future<Output = Result<(), GateError>> + Send;
}

/// External source of tier definitions, polled by the
/// [`Scheduler`](crate::Scheduler).
pub trait TierSource: Send + Sync + 'static {
    /// Fetch the current tier definitions.
    ///
    /// Failures should be reported as [`GateError::ConfigRefreshFailure`].
    fn fetch_tiers(&self) -> impl Future<Output = Result<TierDefinition, GateError>> + Send;
}

/// A [`TierSource`] serving a fixed, replaceable answer.
///
/// Useful offline and in tests, where it can be switched to a failing state with
/// [`fail_with`](StaticTierSource::fail_with).
#[derive(Debug)]
pub struct StaticTierSource {
    answer: RwLock<Result<TierDefinition, String>>,
}

impl StaticTierSource {
    /// Serve `tiers`.
    pub fn new(tiers: TierDefinition) -> Self {
        Self {
            answer: RwLock::new(Ok(tiers)),
        }
    }

    /// Serve `tiers` from now on.
    pub async fn set(&self, tiers: TierDefinition) {
        *self.answer.write().await = Ok(tiers);
    }

    /// Fail every fetch with `reason` from now on.
    pub async fn fail_with(&self, reason: impl Into<String>) {
        *self.answer.write().await = Err(reason.into());
    }
}

impl TierSource for StaticTierSource {
    async fn fetch_tiers(&self) -> Result<TierDefinition, GateError> {
        self.answer
            .read()
            .await
            .clone()
            .map_err(GateError::ConfigRefreshFailure)
    }
}
