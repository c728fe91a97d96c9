use redis::{Script, aio::ConnectionManager};

use crate::{
    CasToken, CounterRecord, CounterStore, GateError, RedisKey, RedisKeyGenerator,
    RedisStoreOptions, UpdateOutcome,
};

const INSERT_IF_ABSENT_SCRIPT: &str = r#"
    local counter_key = KEYS[1]
    local counter_index_key = KEYS[2]
    local version_key = KEYS[3]

    if redis.call("EXISTS", counter_key) == 1 then
        return 0
    end

    local version = redis.call("INCR", version_key)
    redis.call("HSET", counter_key, "count", 0, "version", version)
    redis.call("SADD", counter_index_key, counter_key)

    return 1
"#;

const CONDITIONAL_UPDATE_SCRIPT: &str = r#"
    local counter_key = KEYS[1]
    local version_key = KEYS[2]

    local expected_version = ARGV[1]
    local count = ARGV[2]

    local current_version = redis.call("HGET", counter_key, "version")
    if not current_version or current_version ~= expected_version then
        return 0
    end

    local version = redis.call("INCR", version_key)
    redis.call("HSET", counter_key, "count", count, "version", version)

    return 1
"#;

const CLEAR_SCRIPT: &str = r#"
    local counter_index_key = KEYS[1]

    local counter_keys = redis.call("SMEMBERS", counter_index_key)
    for i = 1, #counter_keys do
        redis.call("DEL", counter_keys[i])
    end
    redis.call("DEL", counter_index_key)

    return #counter_keys
"#;

/// [`CounterStore`] keeping each counter in a Redis hash.
///
/// Versions come from a namespace-wide `INCR` sequence, so they are never reused,
/// including after a reset. Insert, conditional update and clear are Lua scripts
/// and therefore atomic with respect to each other.
pub struct RedisCounterStore {
    connection_manager: ConnectionManager,
    key_generator: RedisKeyGenerator,
    insert_if_absent_script: Script,
    conditional_update_script: Script,
    clear_script: Script,
}

impl RedisCounterStore {
    /// Create a store in the namespace of `options.prefix`.
    pub fn new(options: RedisStoreOptions) -> Self {
        let prefix = options.prefix.unwrap_or_else(RedisKey::default_prefix);

        Self {
            connection_manager: options.connection_manager,
            key_generator: RedisKeyGenerator::new(prefix),
            insert_if_absent_script: Script::new(INSERT_IF_ABSENT_SCRIPT),
            conditional_update_script: Script::new(CONDITIONAL_UPDATE_SCRIPT),
            clear_script: Script::new(CLEAR_SCRIPT),
        }
    }
}

impl CounterStore for RedisCounterStore {
    async fn get(&self, user_id: &str) -> Result<Option<CounterRecord>, GateError> {
        let mut connection_manager = self.connection_manager.clone();
        let counter_key = self.key_generator.counter_key(user_id);

        let (count, version): (Option<u64>, Option<u64>) = redis::cmd("HMGET")
            .arg(&*counter_key)
            .arg("count")
            .arg("version")
            .query_async(&mut connection_manager)
            .await?;

        match (count, version) {
            (Some(count), Some(version)) => Ok(Some(CounterRecord {
                count,
                version: CasToken::new(version),
            })),
            _ => Ok(None),
        }
    } // end method get

    async fn insert_if_absent(&self, user_id: &str) -> Result<bool, GateError> {
        let mut connection_manager = self.connection_manager.clone();

        let inserted: u8 = self
            .insert_if_absent_script
            .key(&*self.key_generator.counter_key(user_id))
            .key(&*self.key_generator.counter_index_key())
            .key(&*self.key_generator.version_key())
            .invoke_async(&mut connection_manager)
            .await?;

        Ok(inserted == 1)
    } // end method insert_if_absent

    async fn conditional_update(
        &self,
        user_id: &str,
        version: CasToken,
        count: u64,
    ) -> Result<UpdateOutcome, GateError> {
        let mut connection_manager = self.connection_manager.clone();

        let updated: u8 = self
            .conditional_update_script
            .key(&*self.key_generator.counter_key(user_id))
            .key(&*self.key_generator.version_key())
            .arg(version.get())
            .arg(count)
            .invoke_async(&mut connection_manager)
            .await?;

        Ok(if updated == 1 {
            UpdateOutcome::Updated
        } else {
            UpdateOutcome::Conflict
        })
    } // end method conditional_update

    async fn clear(&self) -> Result<u64, GateError> {
        let mut connection_manager = self.connection_manager.clone();

        let removed: u64 = self
            .clear_script
            .key(&*self.key_generator.counter_index_key())
            .invoke_async(&mut connection_manager)
            .await?;

        tracing::debug!(
            prefix = self.key_generator.prefix().as_str(),
            removed,
            "cleared redis counters"
        );
        Ok(removed)
    } // end method clear
}
