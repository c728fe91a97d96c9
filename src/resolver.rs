use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::{ConfigStore, GateError, TIER_DEFINITION_KEY, TierDefinition, UserAccount};

/// Configuration for [`QuotaResolver`].
#[derive(Clone, Debug)]
pub struct ResolverOptions {
    /// How long a cached user account or tier definition is served before the
    /// store is read again.
    ///
    /// `Duration::ZERO` disables caching. The scheduler additionally drops the cached
    /// tier definition after every successful refresh.
    pub cache_ttl: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Debug)]
struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

/// Resolves the effective request limit of a user.
///
/// Resolution reads the user's account, then the tier definition singleton, and
/// looks the account's tier up in it. Both reads go through a local cache populated
/// by previous reads; a missing account, definition or tier is a
/// [`GateError::ConfigNotFound`] and never falls back to a default.
#[derive(Debug)]
pub struct QuotaResolver<C> {
    store: Arc<C>,
    cache_ttl: Duration,
    accounts: DashMap<String, Cached<UserAccount>>,
    tiers: DashMap<&'static str, Cached<Arc<TierDefinition>>>,
}

impl<C: ConfigStore> QuotaResolver<C> {
    /// Create a resolver reading from `store`.
    pub fn new(store: Arc<C>, options: ResolverOptions) -> Self {
        Self {
            store,
            cache_ttl: options.cache_ttl,
            accounts: DashMap::new(),
            tiers: DashMap::new(),
        }
    }

    /// The store this resolver reads from.
    pub fn store(&self) -> &Arc<C> {
        &self.store
    }

    /// Resolve the limit that applies to `user_id`.
    pub async fn resolve_limit(&self, user_id: &str) -> Result<u64, GateError> {
        let account = self.user_account(user_id).await?;
        let tiers = self.tier_definition().await?;

        tiers.limit_for(&account.tier).ok_or_else(|| {
            GateError::ConfigNotFound(format!(
                "no limit defined for tier '{}' of user '{user_id}'",
                account.tier
            ))
        })
    } // end method resolve_limit

    /// Drop the cached account of `user_id`.
    pub fn invalidate_user(&self, user_id: &str) {
        self.accounts.remove(user_id);
    }

    /// Drop the cached tier definition.
    pub fn invalidate_tiers(&self) {
        self.tiers.remove(TIER_DEFINITION_KEY);
    }

    async fn user_account(&self, user_id: &str) -> Result<UserAccount, GateError> {
        if let Some(cached) = self.accounts.get(user_id)
            && self.is_fresh(cached.fetched_at)
        {
            return Ok(cached.value.clone());
        }

        let Some(account) = self.store.user_account(user_id).await? else {
            self.accounts.remove(user_id);
            return Err(GateError::ConfigNotFound(format!(
                "no account for user '{user_id}'"
            )));
        };

        if !self.cache_ttl.is_zero() {
            self.accounts.insert(
                user_id.to_string(),
                Cached {
                    value: account.clone(),
                    fetched_at: Instant::now(),
                },
            );
        }

        Ok(account)
    }

    async fn tier_definition(&self) -> Result<Arc<TierDefinition>, GateError> {
        if let Some(cached) = self.tiers.get(TIER_DEFINITION_KEY)
            && self.is_fresh(cached.fetched_at)
        {
            return Ok(Arc::clone(&cached.value));
        }

        let Some(tiers) = self.store.tier_definition().await? else {
            return Err(GateError::ConfigNotFound(format!(
                "tier definition '{TIER_DEFINITION_KEY}' has not been written"
            )));
        };

        let tiers = Arc::new(tiers);

        if !self.cache_ttl.is_zero() {
            self.tiers.insert(
                TIER_DEFINITION_KEY,
                Cached {
                    value: Arc::clone(&tiers),
                    fetched_at: Instant::now(),
                },
            );
        }

        Ok(tiers)
    }

    fn is_fresh(&self, fetched_at: Instant) -> bool {
        fetched_at.elapsed() < self.cache_ttl
    }
}
