use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::conditions::DeviceConditions;
use super::info::{WorkId, WorkInfo, WorkOutcome, WorkState, Worker};
use super::request::{
    BackoffPolicy, Constraints, ExistingWorkPolicy, OneTimeWorkRequest, OutOfQuotaPolicy,
    PeriodicWorkRequest,
};

/// Per-name status channel. `None` until work with that name is first enqueued.
type StatusSender = Arc<watch::Sender<Option<WorkInfo>>>;

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Standard-priority attempts that may run at the same time.
    pub max_concurrent_workers: usize,
    /// How often unmet constraints are re-checked.
    pub constraint_poll: Duration,
    /// Expedited starts granted per `expedited_window`.
    pub expedited_quota: u32,
    pub expedited_window: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_concurrent_workers: 4,
            constraint_poll: Duration::from_secs(30),
            expedited_quota: 10,
            expedited_window: Duration::from_secs(60 * 60),
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// In-process background work runner.
///
/// Work is registered under a unique name; each name has exactly one driver
/// task at a time, which serializes attempts for that name. State changes are
/// published on a per-name [`watch`] channel available through
/// [`WorkEngine::unique_work_info`].
///
/// All enqueue methods spawn onto the current tokio runtime and must be
/// called from within one.
pub struct WorkEngine<W: Worker> {
    core: Arc<EngineCore<W>>,
    registry: Mutex<Registry>,
}

struct EngineCore<W> {
    worker: W,
    conditions: Arc<dyn DeviceConditions>,
    settings: EngineSettings,
    slots: Semaphore,
    quota: Mutex<ExpeditedQuota>,
    next_id: AtomicU64,
}

struct ExpeditedQuota {
    remaining: u32,
    window_start: Instant,
}

#[derive(Default)]
struct Registry {
    unique: HashMap<String, UniqueEntry>,
    status: HashMap<String, StatusSender>,
}

struct UniqueEntry {
    id: WorkId,
    periodic: bool,
    task: JoinHandle<()>,
}

impl Registry {
    fn status_sender(&mut self, name: &str) -> StatusSender {
        self.status
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(watch::channel(None).0))
            .clone()
    }

    /// Existing live work under `name` that `policy` says to keep.
    fn kept(&self, name: &str, policy: ExistingWorkPolicy) -> Option<WorkId> {
        let entry = self.unique.get(name)?;
        if entry.task.is_finished() {
            return None;
        }
        match policy {
            ExistingWorkPolicy::Keep => Some(entry.id),
            ExistingWorkPolicy::Replace => {
                entry.task.abort();
                tracing::debug!(name = %name, work_id = %entry.id, "Replacing existing work");
                None
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<W: Worker> WorkEngine<W> {
    pub fn new(worker: W, conditions: Arc<dyn DeviceConditions>, settings: EngineSettings) -> Self {
        let core = EngineCore {
            worker,
            conditions,
            slots: Semaphore::new(settings.max_concurrent_workers.max(1)),
            quota: Mutex::new(ExpeditedQuota {
                remaining: settings.expedited_quota,
                window_start: Instant::now(),
            }),
            settings,
            next_id: AtomicU64::new(1),
        };
        Self {
            core: Arc::new(core),
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Schedule repeating work under `name`.
    ///
    /// With [`ExistingWorkPolicy::Keep`] an already scheduled periodic run
    /// is left alone (same id, same timing) and its id is returned.
    pub fn enqueue_unique_periodic_work(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: PeriodicWorkRequest,
    ) -> WorkId {
        let mut registry = lock(&self.registry);
        if let Some(id) = registry.kept(name, policy) {
            tracing::debug!(name = %name, work_id = %id, "Periodic work already scheduled, keeping it");
            return id;
        }

        let status = registry.status_sender(name);
        let publisher = self.core.register(status);
        let id = publisher.id;
        tracing::info!(
            name = %name,
            work_id = %id,
            interval_secs = request.interval.as_secs(),
            "Scheduled periodic work"
        );

        let task = tokio::spawn(Arc::clone(&self.core).drive_periodic(publisher, request));
        registry.unique.insert(
            name.to_string(),
            UniqueEntry {
                id,
                periodic: true,
                task,
            },
        );
        id
    }

    /// Schedule one-shot work under `name`.
    ///
    /// With [`ExistingWorkPolicy::Keep`] a request arriving while earlier
    /// work under the same name is still enqueued or running is dropped.
    /// Finished work never blocks a new request.
    pub fn enqueue_unique_work(
        &self,
        name: &str,
        policy: ExistingWorkPolicy,
        request: OneTimeWorkRequest,
    ) -> WorkId {
        let mut registry = lock(&self.registry);
        if let Some(id) = registry.kept(name, policy) {
            tracing::debug!(name = %name, work_id = %id, "Work already pending, keeping it");
            return id;
        }

        let status = registry.status_sender(name);
        let publisher = self.core.register(status);
        let id = publisher.id;
        tracing::debug!(
            name = %name,
            work_id = %id,
            expedited = request.expedited.is_some(),
            "Enqueued one-time work"
        );

        let task = tokio::spawn(Arc::clone(&self.core).drive_once(publisher, request));
        registry.unique.insert(
            name.to_string(),
            UniqueEntry {
                id,
                periodic: false,
                task,
            },
        );
        id
    }

    /// Live status of the work registered under `name`.
    ///
    /// Can be called before anything is enqueued; the channel then holds
    /// `None` until the first enqueue.
    pub fn unique_work_info(&self, name: &str) -> watch::Receiver<Option<WorkInfo>> {
        lock(&self.registry).status_sender(name).subscribe()
    }

    /// Cancel work registered under `name`, returns whether anything was live.
    ///
    /// An in-flight attempt is dropped at its next suspension point and the
    /// work ends CANCELLED.
    pub fn cancel_unique_work(&self, name: &str) -> bool {
        let mut registry = lock(&self.registry);
        let Some(entry) = registry.unique.remove(name) else {
            return false;
        };
        let was_live = !entry.task.is_finished();
        entry.task.abort();

        if let Some(status) = registry.status.get(name) {
            status.send_if_modified(|current| match current {
                Some(info) if info.id == entry.id && (entry.periodic || !info.state.is_finished()) => {
                    info.state = WorkState::Cancelled;
                    true
                }
                _ => false,
            });
        }
        tracing::info!(name = %name, work_id = %entry.id, "Cancelled work");
        was_live
    }

    /// Cancel all registered work.
    pub fn shutdown(&self) {
        let names: Vec<String> = lock(&self.registry).unique.keys().cloned().collect();
        for name in names {
            self.cancel_unique_work(&name);
        }
    }
}

impl<W: Worker> Drop for WorkEngine<W> {
    fn drop(&mut self) {
        for entry in lock(&self.registry).unique.values() {
            entry.task.abort();
        }
    }
}

// ============================================================================
// Drivers
// ============================================================================

/// Writes state for one work id; goes silent once the id is cancelled or
/// replaced so an aborting driver can never overwrite a newer state.
struct Publisher {
    id: WorkId,
    status: StatusSender,
}

impl Publisher {
    fn publish(&self, state: WorkState, run_attempt_count: u32) {
        self.status.send_if_modified(|current| match current {
            Some(info) if info.id == self.id && info.state != WorkState::Cancelled => {
                *info = WorkInfo {
                    id: self.id,
                    state,
                    run_attempt_count,
                };
                true
            }
            _ => false,
        });
    }
}

impl<W: Worker> EngineCore<W> {
    fn register(&self, status: StatusSender) -> Publisher {
        let id = WorkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        status.send_replace(Some(WorkInfo {
            id,
            state: WorkState::Enqueued,
            run_attempt_count: 0,
        }));
        Publisher { id, status }
    }

    async fn drive_periodic(self: Arc<Self>, publisher: Publisher, request: PeriodicWorkRequest) {
        loop {
            let period_start = Instant::now();
            let state = self
                .run_to_completion(&publisher, &request.constraints, &request.backoff, false)
                .await;
            tracing::debug!(work_id = %publisher.id, state = %state, "Periodic run finished");
            tokio::time::sleep(request.interval.saturating_sub(period_start.elapsed())).await;
        }
    }

    async fn drive_once(self: Arc<Self>, publisher: Publisher, request: OneTimeWorkRequest) {
        let expedited = match request.expedited {
            None => false,
            Some(_) if self.take_expedited_quota() => true,
            Some(OutOfQuotaPolicy::RunAsNonExpedited) => {
                tracing::info!(work_id = %publisher.id, "Expedited quota exhausted, running at standard priority");
                false
            }
            Some(OutOfQuotaPolicy::DropWorkRequest) => {
                tracing::info!(work_id = %publisher.id, "Expedited quota exhausted, dropping request");
                publisher.publish(WorkState::Cancelled, 0);
                return;
            }
        };
        self.run_to_completion(&publisher, &request.constraints, &request.backoff, expedited)
            .await;
    }

    /// Run attempts until one succeeds, fails, or the attempt budget is spent.
    async fn run_to_completion(
        &self,
        publisher: &Publisher,
        constraints: &Constraints,
        backoff: &BackoffPolicy,
        expedited: bool,
    ) -> WorkState {
        let mut attempts: u32 = 0;
        loop {
            self.wait_for_constraints(publisher.id, constraints).await;
            attempts += 1;

            let outcome = {
                // Only the first attempt of expedited work skips the queue.
                let _permit = if expedited && attempts == 1 {
                    None
                } else {
                    self.slots.acquire().await.ok()
                };
                publisher.publish(WorkState::Running, attempts);
                self.run_attempt(publisher.id).await
            };

            let final_state = match outcome {
                WorkOutcome::Success => WorkState::Succeeded,
                WorkOutcome::Failure => WorkState::Failed,
                WorkOutcome::Retry if !backoff.allows_attempt(attempts + 1) => {
                    tracing::warn!(
                        work_id = %publisher.id,
                        attempts = attempts,
                        "Retry requested but attempt limit reached"
                    );
                    WorkState::Failed
                }
                WorkOutcome::Retry => {
                    let delay = backoff.delay_for(attempts);
                    tracing::info!(
                        work_id = %publisher.id,
                        attempts = attempts,
                        delay_secs = delay.as_secs_f64(),
                        "Work asked for retry, backing off"
                    );
                    publisher.publish(WorkState::Enqueued, attempts);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            publisher.publish(final_state, attempts);
            return final_state;
        }
    }

    async fn run_attempt(&self, id: WorkId) -> WorkOutcome {
        match AssertUnwindSafe(self.worker.do_work()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(work_id = %id, reason = %reason, "Worker panicked, failing without retry");
                WorkOutcome::Failure
            }
        }
    }

    async fn wait_for_constraints(&self, id: WorkId, constraints: &Constraints) {
        let mut logged = false;
        while !self.constraints_met(*constraints).await {
            if !logged {
                tracing::debug!(work_id = %id, ?constraints, "Waiting for constraints");
                logged = true;
            }
            tokio::time::sleep(self.settings.constraint_poll).await;
        }
    }

    /// Reads device state on the blocking pool; sysfs reads are synchronous.
    async fn constraints_met(&self, constraints: Constraints) -> bool {
        if constraints.is_empty() {
            return true;
        }
        let conditions = Arc::clone(&self.conditions);
        match tokio::task::spawn_blocking(move || constraints.is_satisfied_by(conditions.as_ref()))
            .await
        {
            Ok(met) => met,
            Err(e) => {
                tracing::warn!(error = %e, "Constraint check failed, treating constraints as unmet");
                false
            }
        }
    }

    fn take_expedited_quota(&self) -> bool {
        let mut quota = lock(&self.quota);
        if quota.window_start.elapsed() >= self.settings.expedited_window {
            quota.remaining = self.settings.expedited_quota;
            quota.window_start = Instant::now();
        }
        if quota.remaining == 0 {
            return false;
        }
        quota.remaining -= 1;
        true
    }
}
