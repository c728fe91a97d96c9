//! Storage seams the engine and scheduler are written against.
//!
//! Two implementations ship with the crate: the in-process [`local`](crate::local)
//! stores and, behind the `redis-tokio` feature, the [`redis`](crate::redis) stores.

use std::future::Future;

use crate::{CasToken, CounterRecord, GateError, TierDefinition, UpdateOutcome, UserAccount};

/// Read-mostly store for tier definitions and user tier assignments.
pub trait ConfigStore: Send + Sync + 'static {
    /// Fetch the account of `user_id`, `None` if it does not exist.
    fn user_account(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<UserAccount>, GateError>> + Send;

    /// Fetch the tier definition singleton, `None` if it was never written.
    fn tier_definition(
        &self,
    ) -> impl Future<Output = Result<Option<TierDefinition>, GateError>> + Send;

    /// Replace the tier definition singleton as a whole.
    fn put_tier_definition(
        &self,
        tiers: TierDefinition,
    ) -> impl Future<Output = Result<(), GateError>> + Send;

    /// Create or overwrite a user account.
    fn put_user_account(
        &self,
        account: UserAccount,
    ) -> impl Future<Output = Result<(), GateError>> + Send;
}

/// Store of per-user counters supporting version-checked updates.
///
/// Implementations must guarantee that, of any number of concurrent
/// [`conditional_update`](CounterStore::conditional_update) calls carrying the same
/// token, at most one returns [`UpdateOutcome::Updated`].
pub trait CounterStore: Send + Sync + 'static {
    /// Read the counter of `user_id` together with its version.
    fn get(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Option<CounterRecord>, GateError>> + Send;

    /// Create a zeroed counter for `user_id` unless one exists.
    ///
    /// Returns `false` when the record already existed, which is not an error.
    fn insert_if_absent(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<bool, GateError>> + Send;

    /// Set the counter of `user_id` to `count` if its version is still `version`.
    fn conditional_update(
        &self,
        user_id: &str,
        version: CasToken,
        count: u64,
    ) -> impl Future<Output = Result<UpdateOutcome, GateError>> + Send;

    /// Delete every counter, returning how many were removed.
    fn clear(&self) -> impl Future<Output = Result<u64, GateError>> + Send;
}
