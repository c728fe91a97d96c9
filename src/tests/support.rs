use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use serde_json::{Map, Value};

use crate::{
    AdmissionEngine, AdmissionRequest, CasToken, ConfigStore, CounterRecord, CounterStore,
    EngineOptions, Forwarder, GateError, LocalConfigStore, LocalCounterStore, QuotaResolver,
    ResolverOptions, TierDefinition, UpdateOutcome, UserAccount,
};

/// Forwarder recording every payload it receives, answering with a fixed status.
#[derive(Debug, Default)]
pub(super) struct RecordingForwarder {
    payloads: Mutex<Vec<Map<String, Value>>>,
    failing_status: Option<u16>,
}

impl RecordingForwarder {
    pub(super) fn failing(status: u16) -> Self {
        Self {
            payloads: Mutex::new(Vec::new()),
            failing_status: Some(status),
        }
    }

    pub(super) fn payloads(&self) -> Vec<Map<String, Value>> {
        self.payloads.lock().unwrap().clone()
    }

    pub(super) fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }
}

impl Forwarder for RecordingForwarder {
    async fn forward(&self, request: AdmissionRequest) -> Result<(), GateError> {
        self.payloads.lock().unwrap().push(request.into_payload());

        match self.failing_status {
            Some(status) => Err(GateError::DownstreamError(status)),
            None => Ok(()),
        }
    }
}

/// Counter store wrapper that can lose every conditional update or fail outright.
#[derive(Debug, Default)]
pub(super) struct ContendedCounterStore {
    pub inner: LocalCounterStore,
    pub always_conflict: AtomicBool,
    pub unavailable: AtomicBool,
    pub update_attempts: AtomicUsize,
}

impl CounterStore for ContendedCounterStore {
    async fn get(&self, user_id: &str) -> Result<Option<CounterRecord>, GateError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GateError::StoreUnavailable("counter store down".to_string()));
        }
        self.inner.get(user_id).await
    }

    async fn insert_if_absent(&self, user_id: &str) -> Result<bool, GateError> {
        self.inner.insert_if_absent(user_id).await
    }

    async fn conditional_update(
        &self,
        user_id: &str,
        version: CasToken,
        count: u64,
    ) -> Result<UpdateOutcome, GateError> {
        self.update_attempts.fetch_add(1, Ordering::SeqCst);
        if self.always_conflict.load(Ordering::SeqCst) {
            return Ok(UpdateOutcome::Conflict);
        }
        self.inner.conditional_update(user_id, version, count).await
    }

    async fn clear(&self) -> Result<u64, GateError> {
        self.inner.clear().await
    }
}

/// Config store counting how often the backing store is read.
#[derive(Debug, Default)]
pub(super) struct CountingConfigStore {
    pub inner: LocalConfigStore,
    pub account_reads: AtomicUsize,
    pub tier_reads: AtomicUsize,
}

impl ConfigStore for CountingConfigStore {
    async fn user_account(&self, user_id: &str) -> Result<Option<UserAccount>, GateError> {
        self.account_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.user_account(user_id).await
    }

    async fn tier_definition(&self) -> Result<Option<TierDefinition>, GateError> {
        self.tier_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.tier_definition().await
    }

    async fn put_tier_definition(&self, tiers: TierDefinition) -> Result<(), GateError> {
        self.inner.put_tier_definition(tiers).await
    }

    async fn put_user_account(&self, account: UserAccount) -> Result<(), GateError> {
        self.inner.put_user_account(account).await
    }
}

pub(super) fn tiers(entries: &[(&str, u64)]) -> TierDefinition {
    entries.iter().map(|(tier, limit)| (*tier, *limit)).collect()
}

pub(super) async fn seeded_config(
    tier_entries: &[(&str, u64)],
    accounts: &[(&str, &str)],
) -> Arc<LocalConfigStore> {
    let config = Arc::new(LocalConfigStore::new());
    config
        .put_tier_definition(tiers(tier_entries))
        .await
        .unwrap();

    for (user_id, tier) in accounts {
        config
            .put_user_account(UserAccount::new(*user_id, *tier))
            .await
            .unwrap();
    }

    config
}

pub(super) fn uncached() -> ResolverOptions {
    ResolverOptions {
        cache_ttl: std::time::Duration::ZERO,
    }
}

pub(super) fn engine<C, K, F>(
    config: Arc<C>,
    counters: Arc<K>,
    forwarder: Arc<F>,
) -> AdmissionEngine<C, K, F>
where
    C: ConfigStore,
    K: CounterStore,
    F: Forwarder,
{
    AdmissionEngine::new(
        Arc::new(QuotaResolver::new(config, uncached())),
        counters,
        forwarder,
        EngineOptions::default(),
    )
}

pub(super) fn request(user_id: &str, prompt: &str) -> AdmissionRequest {
    let mut payload = Map::new();
    payload.insert("prompt".to_string(), Value::String(prompt.to_string()));
    AdmissionRequest::new(user_id, payload)
}
