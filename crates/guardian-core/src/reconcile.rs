//! Periodic reconciliation.
//!
//! A uniquely named periodic job that nudges the supervisor with
//! `PeriodicCheck`. It is the backstop for every restart path that can fail:
//! a stopped service gets started again within one interval.
//!
//! The scheduler contract mirrors a platform work queue: jobs are keyed by
//! name, an existing registration is kept or replaced per
//! [`ExistingJobPolicy`], and a run that asks for a retry is re-run after an
//! exponential backoff instead of waiting a full interval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::{Result, SchedulerError};
use crate::supervisor::Supervisor;

pub const JOB_NAME: &str = "guardian_starter_worker";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingJobPolicy {
    /// Leave a live registration alone.
    #[default]
    Keep,
    /// Cancel the live registration and register anew.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Enqueued,
    KeptExisting,
    Replaced,
}

/// Exponential backoff between retried runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub multiplier: u32,
    pub max: Duration,
}

impl Backoff {
    pub fn exponential(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            multiplier: 2,
            max,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let factor = self.multiplier.saturating_pow(exp);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicRequest {
    pub name: String,
    pub interval: Duration,
    pub initial_delay: Duration,
    pub backoff: Backoff,
}

impl PeriodicRequest {
    /// Backoff starts at 30 s and never exceeds the interval.
    pub fn new(name: impl Into<String>, interval: Duration, initial_delay: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            initial_delay,
            backoff: Backoff::exponential(DEFAULT_INITIAL_BACKOFF.min(interval), interval),
        }
    }
}

impl Default for PeriodicRequest {
    fn default() -> Self {
        Self::new(JOB_NAME, DEFAULT_INTERVAL, DEFAULT_INITIAL_DELAY)
    }
}

#[async_trait]
pub trait PeriodicJob: Send + Sync + 'static {
    async fn run(&self) -> JobOutcome;
}

pub trait JobScheduler: Send + Sync {
    fn schedule_unique_periodic(
        &self,
        request: PeriodicRequest,
        policy: ExistingJobPolicy,
        job: Arc<dyn PeriodicJob>,
    ) -> Result<Registration>;

    fn cancel(&self, name: &str) -> bool;

    fn is_scheduled(&self, name: &str) -> bool;
}

struct JobEntry {
    handle: JoinHandle<()>,
    runs: Arc<AtomicU64>,
}

/// In-process scheduler running each job on its own tokio task.
pub struct TokioJobScheduler {
    runtime: Handle,
    jobs: Mutex<HashMap<String, JobEntry>>,
    shut_down: AtomicBool,
}

impl TokioJobScheduler {
    /// Bind to the current runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::with_handle(runtime))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            jobs: Mutex::new(HashMap::new()),
            shut_down: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, JobEntry>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// How many times the named job has run, retries included.
    pub fn runs(&self, name: &str) -> Option<u64> {
        self.lock()
            .get(name)
            .map(|entry| entry.runs.load(Ordering::SeqCst))
    }

    /// Cancel everything and refuse new registrations.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        for (name, entry) in self.lock().drain() {
            entry.handle.abort();
            tracing::debug!(job = %name, "periodic job cancelled");
        }
    }
}

impl JobScheduler for TokioJobScheduler {
    fn schedule_unique_periodic(
        &self,
        request: PeriodicRequest,
        policy: ExistingJobPolicy,
        job: Arc<dyn PeriodicJob>,
    ) -> Result<Registration> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(SchedulerError::Shutdown.into());
        }
        if request.interval.is_zero() {
            return Err(SchedulerError::InvalidInterval { name: request.name }.into());
        }

        let mut jobs = self.lock();
        let registration = match jobs.get(&request.name) {
            Some(existing) if !existing.handle.is_finished() => match policy {
                ExistingJobPolicy::Keep => {
                    tracing::debug!(job = %request.name, "periodic job already scheduled, keeping it");
                    return Ok(Registration::KeptExisting);
                }
                ExistingJobPolicy::Replace => {
                    existing.handle.abort();
                    Registration::Replaced
                }
            },
            _ => Registration::Enqueued,
        };

        let runs = Arc::new(AtomicU64::new(0));
        tracing::info!(
            job = %request.name,
            interval_secs = request.interval.as_secs(),
            initial_delay_secs = request.initial_delay.as_secs(),
            ?registration,
            "periodic job scheduled"
        );
        let name = request.name.clone();
        let handle = self
            .runtime
            .spawn(run_periodic(request, job, Arc::clone(&runs)));
        jobs.insert(name, JobEntry { handle, runs });
        Ok(registration)
    }

    fn cancel(&self, name: &str) -> bool {
        match self.lock().remove(name) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    fn is_scheduled(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|entry| !entry.handle.is_finished())
    }
}

impl Drop for TokioJobScheduler {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in jobs.drain() {
            entry.handle.abort();
        }
    }
}

async fn run_periodic(request: PeriodicRequest, job: Arc<dyn PeriodicJob>, runs: Arc<AtomicU64>) {
    tokio::time::sleep(request.initial_delay).await;
    let mut attempt = 0u32;
    loop {
        runs.fetch_add(1, Ordering::SeqCst);
        let wait = match job.run().await {
            JobOutcome::Success => {
                attempt = 0;
                request.interval
            }
            JobOutcome::Retry => {
                attempt = attempt.saturating_add(1);
                let delay = request.backoff.delay_for_attempt(attempt);
                tracing::debug!(job = %request.name, attempt, delay_secs = delay.as_secs(), "periodic job asked for retry");
                delay
            }
        };
        tokio::time::sleep(wait).await;
    }
}

/// Issues `PeriodicCheck` to the supervisor. Any failure asks for a retry.
pub struct ReconciliationJob {
    supervisor: Supervisor,
}

impl ReconciliationJob {
    pub fn new(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }
}

#[async_trait]
impl PeriodicJob for ReconciliationJob {
    async fn run(&self) -> JobOutcome {
        match self.supervisor.reconcile().await {
            Ok(_) => JobOutcome::Success,
            Err(e) => {
                tracing::warn!(error = %e, "reconciliation failed, will retry");
                JobOutcome::Retry
            }
        }
    }
}

/// Register the reconciliation job, keeping an existing registration.
pub fn schedule_reconciliation(
    scheduler: &dyn JobScheduler,
    supervisor: &Supervisor,
    request: PeriodicRequest,
) -> Result<Registration> {
    scheduler.schedule_unique_periodic(
        request,
        ExistingJobPolicy::Keep,
        Arc::new(ReconciliationJob::new(supervisor.clone())),
    )
}
