use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::worker::NewsSyncWorker;
use crate::work::{
    BackoffPolicy, Constraints, ExistingWorkPolicy, OneTimeWorkRequest, OutOfQuotaPolicy,
    PeriodicWorkRequest, WorkEngine, WorkId, WorkInfo, MIN_BACKOFF,
};

/// Unique name of the recurring background sync.
pub const PERIODIC_SYNC_WORK: &str = "NewsSyncWork";
/// Unique name of the user-triggered sync.
pub const IMMEDIATE_SYNC_WORK: &str = "NewsSyncNow";

/// How the two sync jobs are scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSchedule {
    pub interval: Duration,
    /// Constraints of the periodic job; the on-demand job runs unconstrained
    pub constraints: Constraints,
    pub periodic_backoff: BackoffPolicy,
    pub immediate_backoff: BackoffPolicy,
}

impl Default for SyncSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            constraints: Constraints {
                requires_network: true,
                requires_battery_not_low: true,
            },
            periodic_backoff: BackoffPolicy::linear(MIN_BACKOFF),
            immediate_backoff: BackoffPolicy::exponential(Duration::from_secs(30)),
        }
    }
}

/// Owns the news sync jobs on a [`WorkEngine`].
///
/// Cheap to clone; clones drive the same engine.
#[derive(Clone)]
pub struct NewsSyncScheduler {
    engine: Arc<WorkEngine<NewsSyncWorker>>,
    schedule: SyncSchedule,
}

impl NewsSyncScheduler {
    pub fn new(engine: Arc<WorkEngine<NewsSyncWorker>>, schedule: SyncSchedule) -> Self {
        Self { engine, schedule }
    }

    /// Make sure the recurring sync is scheduled.
    ///
    /// Safe to call on every start: an existing schedule is kept with its
    /// original timing, so there is only ever one.
    pub fn schedule_periodic_sync(&self) -> WorkId {
        let request = PeriodicWorkRequest::new(self.schedule.interval)
            .with_constraints(self.schedule.constraints)
            .with_backoff(self.schedule.periodic_backoff);
        self.engine
            .enqueue_unique_periodic_work(PERIODIC_SYNC_WORK, ExistingWorkPolicy::Keep, request)
    }

    /// Sync as soon as possible.
    ///
    /// Expedited while quota lasts, standard priority after that. While a
    /// previous immediate sync is still pending or running the call is a
    /// no-op and returns that sync's id.
    pub fn sync_immediately(&self) -> WorkId {
        let request = OneTimeWorkRequest::new()
            .with_backoff(self.schedule.immediate_backoff)
            .expedited(OutOfQuotaPolicy::RunAsNonExpedited);
        self.engine
            .enqueue_unique_work(IMMEDIATE_SYNC_WORK, ExistingWorkPolicy::Keep, request)
    }

    pub fn cancel_periodic_sync(&self) -> bool {
        self.engine.cancel_unique_work(PERIODIC_SYNC_WORK)
    }

    /// Live status of the periodic sync.
    pub fn periodic_status(&self) -> watch::Receiver<Option<WorkInfo>> {
        self.engine.unique_work_info(PERIODIC_SYNC_WORK)
    }

    /// Live status of the on-demand sync.
    pub fn immediate_status(&self) -> watch::Receiver<Option<WorkInfo>> {
        self.engine.unique_work_info(IMMEDIATE_SYNC_WORK)
    }

    /// Cancel both jobs.
    pub fn shutdown(&self) {
        self.engine.shutdown();
    }
}
