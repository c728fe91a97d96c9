use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use crate::{
    ConfigStore, GateError, LocalConfigStore, QuotaResolver, ResolverOptions, UserAccount,
    tests::support::{CountingConfigStore, seeded_config, tiers, uncached},
};

fn cached_for(ttl: Duration) -> ResolverOptions {
    ResolverOptions { cache_ttl: ttl }
}

#[tokio::test]
async fn resolves_limit_of_users_tier() {
    let config = seeded_config(&[("Gold", 300), ("Silver", 200)], &[("u1", "Silver")]).await;
    let resolver = QuotaResolver::new(config, uncached());

    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 200);
}

#[tokio::test]
async fn missing_user_is_config_not_found() {
    let config = seeded_config(&[("Gold", 300)], &[]).await;
    let resolver = QuotaResolver::new(config, uncached());

    assert!(matches!(
        resolver.resolve_limit("ghost").await,
        Err(GateError::ConfigNotFound(_))
    ));
}

#[tokio::test]
async fn missing_tier_definition_is_config_not_found() {
    let config = Arc::new(LocalConfigStore::new());
    config
        .put_user_account(UserAccount::new("u1", "Gold"))
        .await
        .unwrap();
    let resolver = QuotaResolver::new(config, uncached());

    assert!(matches!(
        resolver.resolve_limit("u1").await,
        Err(GateError::ConfigNotFound(_))
    ));
}

#[tokio::test]
async fn tier_without_limit_is_config_not_found() {
    let config = seeded_config(&[("Gold", 300)], &[("u1", "Diamond")]).await;
    let resolver = QuotaResolver::new(config, uncached());

    let err = resolver.resolve_limit("u1").await.unwrap_err();
    assert!(matches!(err, GateError::ConfigNotFound(ref message) if message.contains("Diamond")));
}

#[tokio::test]
async fn zero_limit_is_a_valid_limit() {
    let config = seeded_config(&[("Free", 0)], &[("u1", "Free")]).await;
    let resolver = QuotaResolver::new(config, uncached());

    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 0);
}

#[tokio::test]
async fn cached_reads_do_not_hit_the_store() {
    let store = Arc::new(CountingConfigStore::default());
    store.put_tier_definition(tiers(&[("Gold", 3)])).await.unwrap();
    store
        .put_user_account(UserAccount::new("u1", "Gold"))
        .await
        .unwrap();
    let resolver = QuotaResolver::new(Arc::clone(&store), cached_for(Duration::from_secs(60)));

    for _ in 0..5 {
        assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 3);
    }

    assert_eq!(store.account_reads.load(Ordering::SeqCst), 1);
    assert_eq!(store.tier_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cache_serves_stale_definition_until_invalidated() {
    let config = seeded_config(&[("Gold", 3)], &[("u1", "Gold")]).await;
    let resolver = QuotaResolver::new(Arc::clone(&config), cached_for(Duration::from_secs(60)));

    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 3);

    config.put_tier_definition(tiers(&[("Gold", 1)])).await.unwrap();
    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 3);

    resolver.invalidate_tiers();
    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 1);
}

#[tokio::test]
async fn invalidate_user_picks_up_new_tier() {
    let config = seeded_config(&[("Gold", 3), ("Silver", 2)], &[("u1", "Gold")]).await;
    let resolver = QuotaResolver::new(Arc::clone(&config), cached_for(Duration::from_secs(60)));

    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 3);

    config
        .put_user_account(UserAccount::new("u1", "Silver"))
        .await
        .unwrap();
    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 3);

    resolver.invalidate_user("u1");
    assert_eq!(resolver.resolve_limit("u1").await.unwrap(), 2);
}

#[tokio::test]
async fn expired_entries_are_read_again() {
    let store = Arc::new(CountingConfigStore::default());
    store.put_tier_definition(tiers(&[("Gold", 3)])).await.unwrap();
    store
        .put_user_account(UserAccount::new("u1", "Gold"))
        .await
        .unwrap();
    let resolver = QuotaResolver::new(Arc::clone(&store), cached_for(Duration::from_millis(20)));

    resolver.resolve_limit("u1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    resolver.resolve_limit("u1").await.unwrap();

    assert_eq!(store.account_reads.load(Ordering::SeqCst), 2);
    assert_eq!(store.tier_reads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn zero_ttl_disables_caching() {
    let store = Arc::new(CountingConfigStore::default());
    store.put_tier_definition(tiers(&[("Gold", 3)])).await.unwrap();
    store
        .put_user_account(UserAccount::new("u1", "Gold"))
        .await
        .unwrap();
    let resolver = QuotaResolver::new(Arc::clone(&store), uncached());

    for _ in 0..3 {
        resolver.resolve_limit("u1").await.unwrap();
    }

    assert_eq!(store.account_reads.load(Ordering::SeqCst), 3);
    assert_eq!(store.tier_reads.load(Ordering::SeqCst), 3);
}
