use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{CasToken, CounterRecord, CounterStore, GateError, UpdateOutcome};

/// In-memory [`CounterStore`].
///
/// # Versioning
///
/// Every insert and successful update stamps the record with a fresh version drawn
/// from a store-wide sequence. Versions are therefore never reused, even after
/// [`clear`](CounterStore::clear) drops and a later request recreates a record, and a
/// token captured before a reset can never win against the new record.
///
/// # Thread Safety
///
/// The version check and the write happen under the shard write guard of the
/// record's [`DashMap`] entry, which makes each conditional update atomic with
/// respect to every other operation on the same user.
#[derive(Debug)]
pub struct LocalCounterStore {
    counters: DashMap<String, CounterRecord>,
    next_version: AtomicU64,
}

impl LocalCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
            next_version: AtomicU64::new(1),
        }
    }

    /// Number of live counter records.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counter record exists.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    fn next_version(&self) -> CasToken {
        CasToken::new(self.next_version.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for LocalCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterStore for LocalCounterStore {
    async fn get(&self, user_id: &str) -> Result<Option<CounterRecord>, GateError> {
        Ok(self.counters.get(user_id).map(|record| *record))
    }

    async fn insert_if_absent(&self, user_id: &str) -> Result<bool, GateError> {
        if self.counters.contains_key(user_id) {
            return Ok(false);
        }

        let mut inserted = false;
        self.counters.entry(user_id.to_string()).or_insert_with(|| {
            inserted = true;
            CounterRecord {
                count: 0,
                version: self.next_version(),
            }
        });

        Ok(inserted)
    } // end method insert_if_absent

    async fn conditional_update(
        &self,
        user_id: &str,
        version: CasToken,
        count: u64,
    ) -> Result<UpdateOutcome, GateError> {
        let Some(mut record) = self.counters.get_mut(user_id) else {
            // reset between read and update
            return Ok(UpdateOutcome::Conflict);
        };

        if record.version != version {
            return Ok(UpdateOutcome::Conflict);
        }

        record.count = count;
        record.version = self.next_version();

        Ok(UpdateOutcome::Updated)
    } // end method conditional_update

    async fn clear(&self) -> Result<u64, GateError> {
        let mut removed = 0;
        self.counters.retain(|_, _| {
            removed += 1;
            false
        });

        Ok(removed)
    }
}
