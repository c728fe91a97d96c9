/// Error type for this crate.
///
/// Conflicting conditional updates are not represented here: they are reported as
/// [`UpdateOutcome::Conflict`](crate::UpdateOutcome::Conflict) and retried by the
/// admission loop without ever reaching the caller.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// A user account, the tier definition record, or a tier's limit is missing.
    #[error("config not found: {0}")]
    ConfigNotFound(String),

    /// The backing store failed to serve a read or write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Redis error.
    #[cfg(feature = "redis-tokio")]
    #[cfg_attr(docsrs, doc(cfg(feature = "redis-tokio")))]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The downstream endpoint answered with a non-200 status.
    ///
    /// The quota for the request has already been consumed.
    #[error("downstream endpoint answered with status {0}")]
    DownstreamError(u16),

    /// The downstream endpoint could not be reached.
    #[error("downstream endpoint unavailable: {0}")]
    DownstreamUnavailable(String),

    /// Fetching tier definitions from the external source failed.
    #[error("tier refresh failed: {0}")]
    ConfigRefreshFailure(String),

    /// The inbound document could not be turned into an admission request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid Redis key.
    #[error("invalid redis key: {0}")]
    InvalidRedisKey(String),

    /// Invalid schedule interval.
    #[error("invalid schedule interval: {0}")]
    InvalidInterval(String),

    /// The scheduler has already been activated.
    #[error("scheduler already activated")]
    AlreadyActivated,

    /// The scheduler has been shut down and cannot be activated.
    #[error("scheduler shut down")]
    SchedulerShutDown,
}
