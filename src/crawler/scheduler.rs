//! Job scheduler
//!
//! This module handles:
//! - Launching one supervised run per job on the tokio runtime
//! - Global concurrency limiting via a semaphore (runs beyond the ceiling queue)
//! - Replacing a job's previous run before a new one starts
//! - Cooperative cancellation and panic isolation
//! - Reporting each run's outcome through a handle

use crate::crawler::RunOutcome;
use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;

/// Cooperative cancellation flag shared between a run and its controller
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation; the run stops at its next loop boundary
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// The unit of work the scheduler supervises
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    /// Runs a job until it completes, fails, or observes cancellation
    async fn run(&self, job_id: &str, cancel: &CancelToken) -> RunOutcome;

    /// Called when a run panicked; the outcome is reported as Failed
    fn on_panic(&self, job_id: &str, message: &str) {
        tracing::error!("Run of job {} panicked: {}", job_id, message);
    }
}

/// Observes the outcome of one launched run
#[derive(Debug, Clone)]
pub struct JobHandle {
    job_id: String,
    outcome: watch::Receiver<Option<RunOutcome>>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The outcome, if the run has finished
    pub fn outcome(&self) -> Option<RunOutcome> {
        self.outcome.borrow().clone()
    }

    /// Waits for the run to finish
    pub async fn wait(&mut self) -> RunOutcome {
        loop {
            let current = self.outcome.borrow_and_update().clone();
            if let Some(outcome) = current {
                return outcome;
            }
            if self.outcome.changed().await.is_err() {
                return self.outcome().unwrap_or(RunOutcome::Cancelled);
            }
        }
    }
}

struct ActiveUnit {
    generation: u64,
    cancel: CancelToken,
    task: JoinHandle<()>,
}

type ActiveUnits = Arc<Mutex<HashMap<String, ActiveUnit>>>;

fn lock_units(units: &ActiveUnits) -> MutexGuard<'_, HashMap<String, ActiveUnit>> {
    units.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scheduler runs jobs as supervised tasks under a concurrency ceiling
///
/// At most one unit exists per job id; launching a job again cancels the
/// previous unit and waits for it before the new run starts.
pub struct Scheduler {
    runner: Arc<dyn JobRunner>,
    semaphore: Arc<Semaphore>,
    max_concurrent_jobs: usize,
    units: ActiveUnits,
    next_generation: AtomicU64,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `runner` - Executes a single job run
    /// * `max_concurrent_jobs` - How many runs may execute at once
    pub fn new(runner: Arc<dyn JobRunner>, max_concurrent_jobs: usize) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        Self {
            runner,
            semaphore: Arc::new(Semaphore::new(max_concurrent_jobs)),
            max_concurrent_jobs,
            units: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Launches a run of `job_id`
    ///
    /// Must be called from within a tokio runtime. The returned handle
    /// reports the run's outcome.
    pub fn launch(&self, job_id: &str) -> JobHandle {
        let cancel = CancelToken::new();
        let (sender, receiver) = watch::channel(None);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let mut units = lock_units(&self.units);
        let previous = units.remove(job_id).map(|unit| {
            tracing::debug!("Replacing previous run of job {}", job_id);
            unit.cancel.cancel();
            unit.task
        });

        let unit = Unit {
            job_id: job_id.to_string(),
            generation,
            cancel: cancel.clone(),
            runner: Arc::clone(&self.runner),
            semaphore: Arc::clone(&self.semaphore),
            units: Arc::clone(&self.units),
        };
        let task = tokio::spawn(unit.supervise(previous, sender));

        units.insert(
            job_id.to_string(),
            ActiveUnit {
                generation,
                cancel,
                task,
            },
        );

        JobHandle {
            job_id: job_id.to_string(),
            outcome: receiver,
        }
    }

    /// Requests cancellation of a job's run
    ///
    /// Returns false if the job has no unit.
    pub fn cancel(&self, job_id: &str) -> bool {
        match lock_units(&self.units).get(job_id) {
            Some(unit) => {
                unit.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every unit
    pub fn cancel_all(&self) {
        for unit in lock_units(&self.units).values() {
            unit.cancel.cancel();
        }
    }

    /// Returns true if the job has a unit that has not finished
    pub fn status(&self, job_id: &str) -> bool {
        lock_units(&self.units)
            .get(job_id)
            .map(|unit| !unit.task.is_finished())
            .unwrap_or(false)
    }

    /// Number of units queued or running
    pub fn active_count(&self) -> usize {
        lock_units(&self.units)
            .values()
            .filter(|unit| !unit.task.is_finished())
            .count()
    }

    /// Number of runs currently holding a concurrency slot
    pub fn running_count(&self) -> usize {
        self.max_concurrent_jobs - self.semaphore.available_permits()
    }
}

/// Everything a supervised unit needs once spawned
struct Unit {
    job_id: String,
    generation: u64,
    cancel: CancelToken,
    runner: Arc<dyn JobRunner>,
    semaphore: Arc<Semaphore>,
    units: ActiveUnits,
}

impl Unit {
    async fn supervise(
        self,
        previous: Option<JoinHandle<()>>,
        sender: watch::Sender<Option<RunOutcome>>,
    ) {
        if let Some(previous) = previous {
            let _ = previous.await;
        }

        let outcome = self.run_with_permit().await;
        tracing::debug!("Run of job {} finished: {:?}", self.job_id, outcome);

        {
            let mut units = lock_units(&self.units);
            if units
                .get(&self.job_id)
                .map(|unit| unit.generation == self.generation)
                .unwrap_or(false)
            {
                units.remove(&self.job_id);
            }
        }

        sender.send_replace(Some(outcome));
    }

    async fn run_with_permit(&self) -> RunOutcome {
        let _permit = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return RunOutcome::Failed {
                    message: "Scheduler is shut down".to_string(),
                }
            }
        };

        if self.cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let runner = Arc::clone(&self.runner);
        let job_id = self.job_id.clone();
        let cancel = self.cancel.clone();
        let run = tokio::spawn(async move { runner.run(&job_id, &cancel).await });

        match run.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                self.runner.on_panic(&self.job_id, &message);
                RunOutcome::Failed {
                    message: format!("Crawl job panicked: {}", message),
                }
            }
            Err(_) => RunOutcome::Cancelled,
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
