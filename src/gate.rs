//! Top-level entrypoint that wires stores, engine and scheduler together.
//!
//! [`TierGate`] is the process-scoped state of a gateway: it is built once with
//! explicit store handles, [`activate`](TierGate::activate)d once, and shares the
//! same stores and resolver cache between request handling and the background
//! tasks.

use std::sync::Arc;

use crate::{
    ActivationReason, AdmissionEngine, ConfigStore, CounterStore, EngineOptions, Forwarder,
    GateError, QuotaResolver, ResolverOptions, Scheduler, SchedulerOptions, TierSource,
};

/// Top-level configuration for [`TierGate`].
#[derive(Clone, Debug, Default)]
pub struct TierGateOptions {
    /// Options for request admission.
    pub engine: EngineOptions,
    /// Options for quota lookups.
    pub resolver: ResolverOptions,
    /// Options for the background tasks.
    pub scheduler: SchedulerOptions,
}

/// Admission gateway.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use serde_json::json;
/// use tiergate::local::LocalStoreProvider;
/// use tiergate::{
///     ActivationReason, AdmissionRequest, ConfigStore, Forwarder, GateError, StaticTierSource,
///     TierDefinition, TierGate, TierGateOptions, UserAccount,
/// };
///
/// struct Discard;
///
/// impl Forwarder for Discard {
///     async fn forward(&self, _request: AdmissionRequest) -> Result<(), GateError> {
///         Ok(())
///     }
/// }
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let stores = LocalStoreProvider::new();
/// stores.config().put_user_account(UserAccount::new("u1", "Gold")).await.unwrap();
///
/// let gate = TierGate::new(
///     stores.config(),
///     stores.counters(),
///     Arc::new(Discard),
///     Arc::new(StaticTierSource::new(TierDefinition::from_iter([("Gold", 3)]))),
///     TierGateOptions::default(),
/// );
/// gate.activate(ActivationReason::Deploy).await.unwrap();
///
/// let decision = gate
///     .engine()
///     .handle_document(json!({ "user_id": "u1", "prompt": "hello" }))
///     .await
///     .unwrap();
/// assert!(decision.is_admitted());
///
/// gate.shutdown();
/// # });
/// ```
pub struct TierGate<C, K, F, T> {
    engine: AdmissionEngine<C, K, F>,
    scheduler: Arc<Scheduler<C, K, T>>,
}

impl<C, K, F, T> TierGate<C, K, F, T>
where
    C: ConfigStore,
    K: CounterStore,
    F: Forwarder,
    T: TierSource,
{
    /// Create a new, inactive [`TierGate`].
    pub fn new(
        config: Arc<C>,
        counters: Arc<K>,
        forwarder: Arc<F>,
        tier_source: Arc<T>,
        options: TierGateOptions,
    ) -> Self {
        let resolver = Arc::new(QuotaResolver::new(config, options.resolver));

        Self {
            engine: AdmissionEngine::new(
                Arc::clone(&resolver),
                Arc::clone(&counters),
                forwarder,
                options.engine,
            ),
            scheduler: Arc::new(Scheduler::new(
                resolver,
                counters,
                tier_source,
                options.scheduler,
            )),
        }
    }

    /// Load tier definitions, reset counters on deploy and arm the background tasks.
    pub async fn activate(&self, reason: ActivationReason) -> Result<(), GateError> {
        self.scheduler.activate(reason).await
    }

    /// Disarm the background tasks.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Access the admission engine.
    pub fn engine(&self) -> &AdmissionEngine<C, K, F> {
        &self.engine
    }

    /// Access the scheduler.
    pub fn scheduler(&self) -> &Arc<Scheduler<C, K, T>> {
        &self.scheduler
    }
}
