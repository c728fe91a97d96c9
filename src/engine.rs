use std::{num::NonZeroU32, sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    AdmissionDecision, AdmissionRequest, ConfigStore, CounterRecord, CounterStore,
    DEFAULT_IDENTITY_FIELD, Forwarder, GateError, QuotaResolver, UpdateOutcome,
};

/// How the admission loop reacts to contention.
///
/// The default retries forever, yielding between rounds: an `insert_if_absent` that finds the
/// record already present, or a conditional update that loses a race, is the
/// expected transient case and the loop only ends on a decision or a store error.
///
/// Setting [`max_attempts`](RetryPolicy::max_attempts) bounds both loops and turns
/// exhaustion into [`GateError::StoreUnavailable`]. A bounded policy can starve a
/// request under sustained contention on one user; that request fails instead of
/// waiting, which is the accepted tradeoff for a latency bound.
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    /// Maximum number of read/insert or read/update rounds per request.
    pub max_attempts: Option<NonZeroU32>,
    /// Pause between two rounds; multiplied by the attempt number.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Retry forever, only yielding to the runtime between rounds.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up after `max_attempts` rounds, pausing `backoff * attempt` in between.
    pub fn bounded(max_attempts: NonZeroU32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    async fn pause(&self, user_id: &str, attempt: u32, phase: &str) -> Result<(), GateError> {
        if let Some(max_attempts) = self.max_attempts
            && attempt >= max_attempts.get()
        {
            return Err(GateError::StoreUnavailable(format!(
                "{phase} for user '{user_id}' did not settle after {attempt} attempts"
            )));
        }

        if self.backoff.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.backoff.saturating_mul(attempt)).await;
        }

        Ok(())
    }
}

/// Configuration for [`AdmissionEngine`].
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Name of the field carrying the user identity in inbound documents.
    pub identity_field: String,
    /// Retry behaviour of the counter loops.
    pub retry: RetryPolicy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-request admission control.
///
/// # Algorithm
///
/// 1. **Resolve quota:** look the user's limit up through the [`QuotaResolver`]. A
///    missing account, definition or tier fails the request.
/// 2. **Fetch counter:** read the user's [`CounterRecord`]; if absent, insert a zeroed
///    record and read again, until a read succeeds.
/// 3. **Decide:** reject when `count >= limit`. `>=` keeps users that are already
///    above a freshly lowered limit rejected.
/// 4. **Increment:** conditionally write `count + 1` against the version read in
///    step 2. On conflict go back to step 2; on success the request is admitted.
///
/// [`handle`](AdmissionEngine::handle) then forwards the admitted request exactly
/// once. The increment is committed before forwarding and is kept when forwarding
/// fails.
///
/// # Concurrency
///
/// No lock is taken. Under concurrent requests for one user, exactly one conditional
/// update per observed version succeeds; every loser re-reads and re-decides, so at
/// most `limit` requests are admitted per window and no increment is lost or
/// counted twice.
pub struct AdmissionEngine<C, K, F> {
    resolver: Arc<QuotaResolver<C>>,
    counters: Arc<K>,
    forwarder: Arc<F>,
    options: EngineOptions,
}

impl<C, K, F> AdmissionEngine<C, K, F>
where
    C: ConfigStore,
    K: CounterStore,
    F: Forwarder,
{
    /// Create an engine over shared stores and a forwarder.
    pub fn new(
        resolver: Arc<QuotaResolver<C>>,
        counters: Arc<K>,
        forwarder: Arc<F>,
        options: EngineOptions,
    ) -> Self {
        Self {
            resolver,
            counters,
            forwarder,
            options,
        }
    }

    /// Resolver used for quota lookups.
    pub fn resolver(&self) -> &Arc<QuotaResolver<C>> {
        &self.resolver
    }

    /// Parse an inbound JSON document and [`handle`](AdmissionEngine::handle) it.
    pub async fn handle_document(&self, document: Value) -> Result<AdmissionDecision, GateError> {
        let request = AdmissionRequest::from_document(document, &self.options.identity_field)?;
        self.handle(request).await
    }

    /// Admit `request` and, when admitted, forward it downstream.
    ///
    /// Returns the decision. A rejected request is not forwarded. A forwarding
    /// failure is returned as an error even though the quota was consumed.
    pub async fn handle(&self, request: AdmissionRequest) -> Result<AdmissionDecision, GateError> {
        let decision = self.admit(request.user_id()).await?;

        if decision.is_admitted() {
            let user_id = request.user_id().to_string();

            if let Err(err) = self.forwarder.forward(request).await {
                tracing::warn!(
                    user_id = %user_id,
                    count = decision.count(),
                    error = %err,
                    "forwarding failed, quota stays consumed"
                );
                return Err(err);
            }
        }

        Ok(decision)
    } // end method handle

    /// Run the admission state machine for `user_id` without forwarding.
    ///
    /// On [`AdmissionDecision::Admitted`] the user's counter has been incremented
    /// exactly once.
    pub async fn admit(&self, user_id: &str) -> Result<AdmissionDecision, GateError> {
        let limit = self.resolver.resolve_limit(user_id).await?;
        let mut attempt = 0;

        loop {
            let CounterRecord { count, version } = self.fetch_counter(user_id).await?;

            if count >= limit {
                tracing::info!(user_id, count, limit, "tier limit reached, rejecting");
                return Ok(AdmissionDecision::Rejected { count, limit });
            }

            match self
                .counters
                .conditional_update(user_id, version, count + 1)
                .await?
            {
                UpdateOutcome::Updated => {
                    tracing::debug!(user_id, count = count + 1, limit, "admitted");
                    return Ok(AdmissionDecision::Admitted {
                        count: count + 1,
                        limit,
                    });
                }
                UpdateOutcome::Conflict => {
                    attempt += 1;
                    tracing::debug!(user_id, %version, attempt, "counter changed concurrently, retrying");
                    self.options
                        .retry
                        .pause(user_id, attempt, "counter update")
                        .await?;
                }
            }
        }
    } // end method admit

    async fn fetch_counter(&self, user_id: &str) -> Result<CounterRecord, GateError> {
        let mut attempt = 0;

        loop {
            if let Some(record) = self.counters.get(user_id).await? {
                return Ok(record);
            }

            if self.counters.insert_if_absent(user_id).await? {
                tracing::debug!(user_id, "created counter");
            }

            attempt += 1;
            if attempt > 1 {
                // the record keeps vanishing between insert and read, e.g. under resets
                self.options
                    .retry
                    .pause(user_id, attempt - 1, "counter creation")
                    .await?;
            }
        }
    } // end method fetch_counter
}
