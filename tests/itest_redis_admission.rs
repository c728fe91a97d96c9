#![cfg(feature = "redis-tokio")]

use std::{
    env,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use tiergate::redis::{RedisKey, RedisStoreOptions, RedisStoreProvider};
use tiergate::{
    ActivationReason, AdmissionEngine, AdmissionRequest, ConfigStore, CounterStore,
    EngineOptions, Forwarder, GateError, QuotaResolver, ResolverOptions, StaticTierSource,
    TierDefinition, TierGate, TierGateOptions, UpdateOutcome, UserAccount,
};

fn redis_url() -> Option<String> {
    env::var("REDIS_URL").ok()
}

fn unique_prefix() -> RedisKey {
    let n: u64 = rand::random();
    RedisKey::try_from(format!("tiergate_test_{n}")).unwrap()
}

async fn build_provider(url: &str) -> RedisStoreProvider {
    let client = redis::Client::open(url).unwrap();
    let connection_manager = client.get_connection_manager().await.unwrap();

    RedisStoreProvider::new(RedisStoreOptions {
        connection_manager,
        prefix: Some(unique_prefix()),
    })
}

#[derive(Default)]
struct CountingForwarder {
    calls: AtomicUsize,
}

impl Forwarder for CountingForwarder {
    async fn forward(&self, _request: AdmissionRequest) -> Result<(), GateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn seed(provider: &RedisStoreProvider, tiers: &[(&str, u64)], accounts: &[(&str, &str)]) {
    provider
        .config()
        .put_tier_definition(tiers.iter().map(|(tier, limit)| (*tier, *limit)).collect())
        .await
        .unwrap();

    for (user_id, tier) in accounts {
        provider
            .config()
            .put_user_account(UserAccount::new(*user_id, *tier))
            .await
            .unwrap();
    }
}

#[test]
fn insert_if_absent_creates_one_zeroed_record() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = build_provider(&url).await.counters();

        assert!(counters.get("u1").await.unwrap().is_none());
        assert!(counters.insert_if_absent("u1").await.unwrap());
        assert!(!counters.insert_if_absent("u1").await.unwrap());

        assert_eq!(counters.get("u1").await.unwrap().unwrap().count, 0);
    });
}

#[test]
fn conditional_update_detects_stale_versions() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = build_provider(&url).await.counters();
        counters.insert_if_absent("u1").await.unwrap();
        let stale = counters.get("u1").await.unwrap().unwrap();

        assert_eq!(
            counters
                .conditional_update("u1", stale.version, 1)
                .await
                .unwrap(),
            UpdateOutcome::Updated
        );
        assert_eq!(
            counters
                .conditional_update("u1", stale.version, 1)
                .await
                .unwrap(),
            UpdateOutcome::Conflict
        );
        assert_eq!(counters.get("u1").await.unwrap().unwrap().count, 1);
    });
}

#[test]
fn clear_removes_counters_and_never_reuses_versions() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let counters = build_provider(&url).await.counters();
        for user_id in ["a", "b", "c"] {
            counters.insert_if_absent(user_id).await.unwrap();
        }
        let before_reset = counters.get("a").await.unwrap().unwrap();

        assert_eq!(counters.clear().await.unwrap(), 3);
        assert!(counters.get("a").await.unwrap().is_none());

        assert_eq!(
            counters
                .conditional_update("a", before_reset.version, 1)
                .await
                .unwrap(),
            UpdateOutcome::Conflict
        );

        counters.insert_if_absent("a").await.unwrap();
        let after_reset = counters.get("a").await.unwrap().unwrap();
        assert_ne!(before_reset.version, after_reset.version);
    });
}

#[test]
fn tier_definition_is_replaced_as_a_whole() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let config = build_provider(&url).await.config();

        assert!(config.tier_definition().await.unwrap().is_none());

        config
            .put_tier_definition(TierDefinition::from_iter([("Gold", 300), ("Silver", 200)]))
            .await
            .unwrap();
        config
            .put_tier_definition(TierDefinition::from_iter([("Gold", 10)]))
            .await
            .unwrap();

        assert_eq!(
            config.tier_definition().await.unwrap(),
            Some(TierDefinition::from_iter([("Gold", 10)]))
        );
    });
}

#[test]
fn user_accounts_round_trip() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let config = build_provider(&url).await.config();

        assert!(config.user_account("u1").await.unwrap().is_none());

        config
            .put_user_account(UserAccount::new("u1", "Gold").with_name("User-1"))
            .await
            .unwrap();
        config
            .put_user_account(UserAccount::new("u2", "Silver"))
            .await
            .unwrap();

        assert_eq!(
            config.user_account("u1").await.unwrap(),
            Some(UserAccount::new("u1", "Gold").with_name("User-1"))
        );
        assert_eq!(
            config.user_account("u2").await.unwrap(),
            Some(UserAccount::new("u2", "Silver"))
        );
    });
}

#[test]
fn concurrent_admission_respects_the_limit() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        const LIMIT: u64 = 10;

        let provider = build_provider(&url).await;
        seed(&provider, &[("Gold", LIMIT)], &[("hot", "Gold")]).await;

        let forwarder = Arc::new(CountingForwarder::default());
        let engine = Arc::new(AdmissionEngine::new(
            Arc::new(QuotaResolver::new(
                provider.config(),
                ResolverOptions::default(),
            )),
            provider.counters(),
            Arc::clone(&forwarder),
            EngineOptions::default(),
        ));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    engine
                        .handle(AdmissionRequest::new("hot", Default::default()))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let admitted = futures::future::join_all(handles)
            .await
            .into_iter()
            .filter(|decision| decision.as_ref().unwrap().is_admitted())
            .count() as u64;

        assert_eq!(admitted, LIMIT);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst) as u64, LIMIT);
        assert_eq!(
            provider.counters().get("hot").await.unwrap().unwrap().count,
            LIMIT
        );
    });
}

#[test]
fn two_gates_on_one_namespace_share_quota() {
    let Some(url) = redis_url() else {
        return;
    };

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let client = redis::Client::open(url.as_str()).unwrap();
        let connection_manager = client.get_connection_manager().await.unwrap();
        let options = RedisStoreOptions {
            connection_manager,
            prefix: Some(unique_prefix()),
        };
        let first = RedisStoreProvider::new(options.clone());
        let second = RedisStoreProvider::new(options);
        seed(&first, &[], &[("u1", "Gold")]).await;

        let tiers = TierDefinition::from_iter([("Gold", 3)]);
        let gate_a = TierGate::new(
            first.config(),
            first.counters(),
            Arc::new(CountingForwarder::default()),
            Arc::new(StaticTierSource::new(tiers.clone())),
            TierGateOptions::default(),
        );
        let gate_b = TierGate::new(
            second.config(),
            second.counters(),
            Arc::new(CountingForwarder::default()),
            Arc::new(StaticTierSource::new(tiers)),
            TierGateOptions::default(),
        );

        gate_a.activate(ActivationReason::Deploy).await.unwrap();
        gate_b.activate(ActivationReason::Resume).await.unwrap();

        let mut admitted = 0;
        for i in 0..6 {
            let gate = if i % 2 == 0 { &gate_a } else { &gate_b };
            if gate.engine().admit("u1").await.unwrap().is_admitted() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 3);

        gate_a.shutdown();
        gate_b.shutdown();
    });
}
