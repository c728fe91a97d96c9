use std::collections::HashMap;

use redis::aio::ConnectionManager;

use crate::{
    ConfigStore, GateError, RedisKey, RedisKeyGenerator, RedisStoreOptions, TierDefinition,
    UserAccount,
};

/// [`ConfigStore`] over Redis hashes.
///
/// The tier definition is replaced inside a `MULTI`/`EXEC` transaction, so readers
/// never observe a partially written mapping. An empty definition hash reads as
/// absent.
pub struct RedisConfigStore {
    connection_manager: ConnectionManager,
    key_generator: RedisKeyGenerator,
}

impl RedisConfigStore {
    /// Create a store in the namespace of `options.prefix`.
    pub fn new(options: RedisStoreOptions) -> Self {
        let prefix = options.prefix.unwrap_or_else(RedisKey::default_prefix);

        Self {
            connection_manager: options.connection_manager,
            key_generator: RedisKeyGenerator::new(prefix),
        }
    }
}

impl ConfigStore for RedisConfigStore {
    async fn user_account(&self, user_id: &str) -> Result<Option<UserAccount>, GateError> {
        let mut connection_manager = self.connection_manager.clone();
        let account_key = self.key_generator.account_key(user_id);

        let (tier, name): (Option<String>, Option<String>) = redis::cmd("HMGET")
            .arg(&*account_key)
            .arg("tier")
            .arg("name")
            .query_async(&mut connection_manager)
            .await?;

        Ok(tier.map(|tier| UserAccount {
            user_id: user_id.to_string(),
            tier,
            name,
        }))
    }

    async fn tier_definition(&self) -> Result<Option<TierDefinition>, GateError> {
        let mut connection_manager = self.connection_manager.clone();
        let tier_definition_key = self.key_generator.tier_definition_key();

        let tiers: HashMap<String, u64> = redis::cmd("HGETALL")
            .arg(&*tier_definition_key)
            .query_async(&mut connection_manager)
            .await?;

        if tiers.is_empty() {
            return Ok(None);
        }

        Ok(Some(TierDefinition::from(tiers)))
    }

    async fn put_tier_definition(&self, tiers: TierDefinition) -> Result<(), GateError> {
        let mut connection_manager = self.connection_manager.clone();
        let tier_definition_key = self.key_generator.tier_definition_key();

        let fields: Vec<(&str, u64)> = tiers.iter().collect();

        let mut pipe = redis::pipe();
        pipe.atomic().del(&*tier_definition_key).ignore();
        if !fields.is_empty() {
            pipe.hset_multiple(&*tier_definition_key, &fields).ignore();
        }

        pipe.query_async::<()>(&mut connection_manager).await?;

        Ok(())
    } // end method put_tier_definition

    async fn put_user_account(&self, account: UserAccount) -> Result<(), GateError> {
        let mut connection_manager = self.connection_manager.clone();
        let account_key = self.key_generator.account_key(&account.user_id);

        let mut pipe = redis::pipe();
        pipe.atomic().del(&*account_key).ignore();
        pipe.cmd("HSET")
            .arg(&*account_key)
            .arg("tier")
            .arg(&account.tier)
            .ignore();
        if let Some(name) = &account.name {
            pipe.cmd("HSET").arg(&*account_key).arg("name").arg(name).ignore();
        }

        pipe.query_async::<()>(&mut connection_manager).await?;

        Ok(())
    }
}
