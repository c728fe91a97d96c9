use std::{ops::Deref, sync::Arc};

use crate::{GateError, TIER_DEFINITION_KEY};

/// A validated newtype for Redis key prefixes.
///
/// This is a string with the following constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct RedisKey(Arc<str>);

impl RedisKey {
    /// Create a new default prefix.
    pub fn default_prefix() -> Self {
        Self(Arc::from("tiergate"))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for RedisKey {
    type Target = Arc<str>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for RedisKey {
    type Error = GateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(GateError::InvalidRedisKey(
                "Redis key must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(GateError::InvalidRedisKey(
                "Redis key must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(GateError::InvalidRedisKey(
                "Redis key must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

/// Builds the keys of one gateway namespace.
///
/// Layout, for prefix `p`:
/// - `p:limits` hash `tier -> limit`
/// - `p:account:<user>` hash with fields `tier` and optional `name`
/// - `p:counter:<user>` hash with fields `count`, `version`
/// - `p:counters` set of live counter keys
/// - `p:version` sequence counter versions are drawn from
///
/// Only the fixed keys are precomputed. User ids come from inbound requests, so
/// per-user keys are built on every call and never retained.
#[derive(Debug)]
pub(crate) struct RedisKeyGenerator {
    prefix: RedisKey,
    tier_definition_key: Arc<str>,
    counter_index_key: Arc<str>,
    version_key: Arc<str>,
}

impl RedisKeyGenerator {
    pub(crate) fn new(prefix: RedisKey) -> Self {
        Self {
            tier_definition_key: Arc::from(format!("{}:{TIER_DEFINITION_KEY}", *prefix)),
            counter_index_key: Arc::from(format!("{}:counters", *prefix)),
            version_key: Arc::from(format!("{}:version", *prefix)),
            prefix,
        }
    }

    pub(crate) fn prefix(&self) -> &RedisKey {
        &self.prefix
    }

    pub(crate) fn tier_definition_key(&self) -> Arc<str> {
        self.tier_definition_key.clone()
    }

    pub(crate) fn counter_index_key(&self) -> Arc<str> {
        self.counter_index_key.clone()
    }

    pub(crate) fn version_key(&self) -> Arc<str> {
        self.version_key.clone()
    }

    pub(crate) fn account_key(&self, user_id: &str) -> String {
        format!("{}:account:{user_id}", *self.prefix)
    }

    pub(crate) fn counter_key(&self, user_id: &str) -> String {
        format!("{}:counter:{user_id}", *self.prefix)
    }
}
