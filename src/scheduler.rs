//! Background maintenance of tier definitions and counters.
//!
//! The scheduler owns two recurring tasks:
//!
//! - **tier refresh** (default every 24 hours) pulls tier definitions from a
//!   [`TierSource`] and overwrites the definition record. A failed fetch is logged
//!   and the previous definition stays in place.
//! - **counter reset** (default every hour) deletes every counter record, opening a
//!   fresh quota window for all users.
//!
//! Each task is a fire-once timer that re-arms itself after its body completes, so
//! the schedule drifts by the task's own execution time.

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;

use crate::{
    ActivationReason, ConfigStore, CounterStore, GateError, QuotaResolver, ScheduleInterval,
    TierSource,
    runtime::{after, delay_until, spawn_task},
};

/// Name of the tier refresh task.
pub const TIER_REFRESH_TASK: &str = "tier-refresh";

/// Name of the counter reset task.
pub const COUNTER_RESET_TASK: &str = "counter-reset";

/// Configuration for [`Scheduler`].
#[derive(Clone, Debug)]
pub struct SchedulerOptions {
    /// Time between two tier refreshes.
    pub tier_refresh_interval: ScheduleInterval,
    /// Time between two counter resets, i.e. the length of a quota window.
    pub counter_reset_interval: ScheduleInterval,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tier_refresh_interval: ScheduleInterval::tier_refresh_default(),
            counter_reset_interval: ScheduleInterval::counter_reset_default(),
        }
    }
}

/// Runs tier refreshes and counter resets next to request handling.
///
/// A scheduler is single use: [`activate`](Scheduler::activate) arms the timers
/// once, [`shutdown`](Scheduler::shutdown) disarms them for good. Dropping the last
/// handle does not stop armed timers, since each holds its own handle.
pub struct Scheduler<C, K, T> {
    resolver: Arc<QuotaResolver<C>>,
    counters: Arc<K>,
    tier_source: Arc<T>,
    options: SchedulerOptions,
    activated: AtomicBool,
    shutdown: watch::Sender<bool>,
    next_runs: DashMap<&'static str, DateTime<Utc>>,
}

impl<C, K, T> Scheduler<C, K, T>
where
    C: ConfigStore,
    K: CounterStore,
    T: TierSource,
{
    /// Create an inactive scheduler.
    ///
    /// The tier definition is written to the resolver's store, and the resolver's
    /// cached definition is dropped after every write.
    pub fn new(
        resolver: Arc<QuotaResolver<C>>,
        counters: Arc<K>,
        tier_source: Arc<T>,
        options: SchedulerOptions,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            resolver,
            counters,
            tier_source,
            options,
            activated: AtomicBool::new(false),
            shutdown,
            next_runs: DashMap::new(),
        }
    }

    /// Bootstrap state and arm both recurring tasks.
    ///
    /// Fetches and writes the tier definitions, failing the activation if that is not
    /// possible. On [`ActivationReason::Deploy`] every existing counter is deleted
    /// before the timers are armed. A scheduler that was shut down refuses
    /// activation without touching any state.
    pub async fn activate(self: &Arc<Self>, reason: ActivationReason) -> Result<(), GateError> {
        if self.is_shut_down() {
            return Err(GateError::SchedulerShutDown);
        }

        if self.activated.swap(true, Ordering::AcqRel) {
            return Err(GateError::AlreadyActivated);
        }

        if let Err(err) = self.bootstrap(reason).await {
            self.activated.store(false, Ordering::Release);
            return Err(err);
        }

        self.arm_tier_refresh();
        self.arm_counter_reset();

        tracing::info!(?reason, "scheduler activated");
        Ok(())
    } // end method activate

    async fn bootstrap(&self, reason: ActivationReason) -> Result<(), GateError> {
        self.refresh_tiers().await?;

        if reason == ActivationReason::Deploy {
            let removed = self.reset_counters().await?;
            tracing::info!(removed, "deleted existing counters on deploy");
        }

        Ok(())
    }

    /// Disarm both tasks. A task already running finishes but does not re-arm.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
        self.next_runs.clear();
        tracing::info!("scheduler shut down");
    }

    /// Whether [`shutdown`](Scheduler::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// When the task named `task_name` fires next, if it is armed.
    pub fn next_run(&self, task_name: &str) -> Option<DateTime<Utc>> {
        self.next_runs.get(task_name).map(|when| *when)
    }

    /// Run `task` once at `when` under `task_name`.
    ///
    /// Nothing is spawned after [`shutdown`](Scheduler::shutdown); a pending run is
    /// dropped when shutdown happens before it fires. The entry reported by
    /// [`next_run`](Scheduler::next_run) is removed once the timer fires.
    pub fn schedule_once<Fut>(
        self: &Arc<Self>,
        task_name: &'static str,
        when: DateTime<Utc>,
        task: Fut,
    ) where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut shutdown = self.shutdown.subscribe();

        // Recorded before the shutdown check, so a concurrent shutdown either
        // clears it or is seen below.
        self.next_runs.insert(task_name, when);
        if *shutdown.borrow_and_update() {
            self.disarm(task_name, when);
            tracing::debug!(task = task_name, "scheduler shut down, not arming");
            return;
        }

        tracing::debug!(task = task_name, %when, "armed");

        let delay = delay_until(when);
        let this = Arc::clone(self);
        spawn_task(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    this.disarm(task_name, when);
                    return;
                }
            }

            this.disarm(task_name, when);
            tracing::info!(task = task_name, "timer fired");
            task.await;
        });
    } // end method schedule_once

    fn disarm(&self, task_name: &'static str, when: DateTime<Utc>) {
        self.next_runs.remove_if(task_name, |_, armed| *armed == when);
    }

    /// Fetch tier definitions and overwrite the stored ones.
    ///
    /// On failure the stored definition is left untouched.
    pub async fn refresh_tiers(&self) -> Result<(), GateError> {
        let tiers = self.tier_source.fetch_tiers().await?;
        let tier_count = tiers.len();

        self.resolver.store().put_tier_definition(tiers).await?;
        self.resolver.invalidate_tiers();

        tracing::info!(tier_count, "tier definitions refreshed");
        Ok(())
    }

    /// Delete every counter record, returning how many were removed.
    pub async fn reset_counters(&self) -> Result<u64, GateError> {
        let removed = self.counters.clear().await?;
        tracing::info!(removed, "counters reset");
        Ok(removed)
    }

    fn arm_tier_refresh(self: &Arc<Self>) {
        let when = after(*self.options.tier_refresh_interval);
        let this = Arc::clone(self);

        self.schedule_once(TIER_REFRESH_TASK, when, async move {
            if let Err(err) = this.refresh_tiers().await {
                tracing::warn!(error = %err, "tier refresh failed, keeping previous definition");
            }

            this.arm_tier_refresh();
        });
    }

    fn arm_counter_reset(self: &Arc<Self>) {
        let when = after(*self.options.counter_reset_interval);
        let this = Arc::clone(self);

        self.schedule_once(COUNTER_RESET_TASK, when, async move {
            if let Err(err) = this.reset_counters().await {
                tracing::error!(error = %err, "counter reset failed");
            }

            this.arm_counter_reset();
        });
    }
}
