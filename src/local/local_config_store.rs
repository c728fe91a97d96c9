use dashmap::DashMap;

use crate::{ConfigStore, GateError, TIER_DEFINITION_KEY, TierDefinition, UserAccount};

/// In-memory [`ConfigStore`].
///
/// The tier definition lives under [`TIER_DEFINITION_KEY`] and is replaced as a
/// whole on every write, so readers observe either the old or the new mapping.
#[derive(Debug, Default)]
pub struct LocalConfigStore {
    accounts: DashMap<String, UserAccount>,
    documents: DashMap<&'static str, TierDefinition>,
}

impl LocalConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of user accounts stored.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl ConfigStore for LocalConfigStore {
    async fn user_account(&self, user_id: &str) -> Result<Option<UserAccount>, GateError> {
        Ok(self.accounts.get(user_id).map(|account| account.clone()))
    }

    async fn tier_definition(&self) -> Result<Option<TierDefinition>, GateError> {
        Ok(self
            .documents
            .get(TIER_DEFINITION_KEY)
            .map(|tiers| tiers.clone()))
    }

    async fn put_tier_definition(&self, tiers: TierDefinition) -> Result<(), GateError> {
        self.documents.insert(TIER_DEFINITION_KEY, tiers);
        Ok(())
    }

    async fn put_user_account(&self, account: UserAccount) -> Result<(), GateError> {
        self.accounts.insert(account.user_id.clone(), account);
        Ok(())
    }
}
