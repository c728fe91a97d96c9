use std::sync::Arc;

use crate::{LocalConfigStore, LocalCounterStore};

/// A pair of in-process stores sharing the process lifetime.
///
/// Handles are reference counted so the same stores can be passed to the
/// [`AdmissionEngine`](crate::AdmissionEngine) and the
/// [`Scheduler`](crate::Scheduler).
#[derive(Clone, Debug, Default)]
pub struct LocalStoreProvider {
    config: Arc<LocalConfigStore>,
    counters: Arc<LocalCounterStore>,
}

impl LocalStoreProvider {
    /// Create a provider with empty stores.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tier configuration and user accounts.
    pub fn config(&self) -> Arc<LocalConfigStore> {
        Arc::clone(&self.config)
    }

    /// Per-user counters.
    pub fn counters(&self) -> Arc<LocalCounterStore> {
        Arc::clone(&self.counters)
    }
}
