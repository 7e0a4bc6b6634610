//! Worker pool supervisor
//!
//! Starts one [`DeviceWorker`] per device, tracks their handles and states,
//! and coordinates a bounded shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::device::{DeviceWorker, PublicationSlot};
use super::state::{WorkerState, WorkerStats, WorkerStatsSnapshot};
use crate::backend::{BackendLoader, DeviceId};
use crate::queue::TaskQueue;
use crate::reliability::RetryPolicy;
use crate::store::ArtifactStore;

/// Negative prompt sent with every generation unless configured otherwise
pub const DEFAULT_NEGATIVE_PROMPT: &str =
    "ugly, deformed, noisy, blurry, low contrast, text, watermark, bad anatomy, bad hands, low quality";

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Images requested from the backend per task
    pub batch_size: usize,

    /// Negative prompt passed with every task
    pub negative_prompt: String,

    /// Pause after a task fault before taking the next task
    #[serde(with = "crate::duration_millis")]
    pub fault_cooldown: Duration,

    /// Default grace period for [`WorkerPool::shutdown`]
    #[serde(with = "crate::duration_millis")]
    pub shutdown_timeout: Duration,

    /// How long shutdown waits, past the grace period, for a publication
    /// left behind by an aborted worker
    #[serde(with = "crate::duration_millis")]
    pub forced_termination: Duration,

    /// Retry policy for faulted tasks
    pub retry: RetryPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            fault_cooldown: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
            forced_termination: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size (minimum 1)
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    /// Set the post-fault cooldown
    pub fn with_fault_cooldown(mut self, cooldown: Duration) -> Self {
        self.fault_cooldown = cooldown;
        self
    }

    /// Set the shutdown grace period
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the bound on waiting for publications after workers are aborted
    pub fn with_forced_termination(mut self, timeout: Duration) -> Self {
        self.forced_termination = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolStatus {
    /// Workers are taking tasks
    Running,
    /// Shutdown in progress
    Draining,
    /// Every worker has exited or been aborted
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    /// The backend reported zero devices
    #[error("no compute devices available")]
    NoDevices,

    /// Unknown device rank
    #[error("no worker for device {0}")]
    UnknownDevice(DeviceId),
}

/// Outcome of [`WorkerPool::shutdown`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Workers that exited on their own before the deadline
    pub graceful: usize,
    /// Workers aborted at the deadline
    pub forced: usize,
    /// Workers whose task had already ended in a panic
    pub failed: usize,
    /// Publications still running when the forced-termination delay ran out
    pub abandoned: usize,
    /// Queued tasks discarded without running
    pub discarded: usize,
}

struct WorkerSlot {
    device: DeviceId,
    state: Arc<watch::Sender<WorkerState>>,
    stats: Arc<WorkerStats>,
    publication: Arc<PublicationSlot>,
}

/// Supervisor of the device workers
///
/// # Example
///
/// ```ignore
/// use genpool_dispatch::prelude::*;
///
/// let queue = Arc::new(TaskQueue::new(100));
/// let store = ArtifactStore::new("./img");
/// let pool = WorkerPool::start(
///     WorkerPoolConfig::default(),
///     Arc::new(PatternLoader::new(2)),
///     Arc::clone(&queue),
///     store,
/// )?;
///
/// // ... later
/// let report = pool.shutdown(Duration::from_secs(5)).await;
/// ```
pub struct WorkerPool {
    config: Arc<WorkerPoolConfig>,
    queue: Arc<TaskQueue>,
    store: ArtifactStore,
    workers: Vec<WorkerSlot>,
    handles: Mutex<Vec<(DeviceId, JoinHandle<()>)>>,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<PoolStatus>,
    shutdown_started: AtomicBool,
}

impl WorkerPool {
    /// Spawn one worker per device the loader reports.
    ///
    /// Must be called from within a tokio runtime. A device whose backend
    /// fails to load leaves its worker `Terminated`; the others keep running.
    #[instrument(skip_all)]
    pub fn start(
        config: WorkerPoolConfig,
        loader: Arc<dyn BackendLoader>,
        queue: Arc<TaskQueue>,
        store: ArtifactStore,
    ) -> Result<Self, WorkerPoolError> {
        let device_count = loader.device_count();
        if device_count == 0 {
            return Err(WorkerPoolError::NoDevices);
        }

        info!(
            devices = device_count,
            batch_size = config.batch_size,
            queue_capacity = queue.capacity(),
            output_dir = %store.root().display(),
            "Starting worker pool"
        );

        let config = Arc::new(config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::with_capacity(device_count);
        let mut handles = Vec::with_capacity(device_count);

        for rank in 0..device_count as u32 {
            let device = DeviceId(rank);
            let (state, _) = watch::channel(WorkerState::Initializing);
            let state = Arc::new(state);
            let stats = Arc::new(WorkerStats::default());
            let publication = Arc::new(PublicationSlot::default());

            let worker = DeviceWorker::new(
                device,
                Arc::clone(&loader),
                Arc::clone(&queue),
                store.clone(),
                Arc::clone(&config),
                Arc::clone(&state),
                Arc::clone(&stats),
                Arc::clone(&publication),
                shutdown_rx.clone(),
            );
            handles.push((device, tokio::spawn(worker.run())));
            workers.push(WorkerSlot {
                device,
                state,
                stats,
                publication,
            });
        }

        Ok(Self {
            config,
            queue,
            store,
            workers,
            handles: Mutex::new(handles),
            shutdown_tx,
            status: RwLock::new(PoolStatus::Running),
            shutdown_started: AtomicBool::new(false),
        })
    }

    /// Stop every worker within `grace`.
    ///
    /// Closes the queue, signals the workers, waits for them until the
    /// deadline and aborts whichever are still running. A publication an
    /// aborted worker left on the blocking pool is halted at the next
    /// artifact boundary and waited for (up to `forced_termination`), so
    /// once this returns no batch is still being written. Tasks left in the
    /// queue are discarded. Only the first call does any work; later calls
    /// return an empty report.
    #[instrument(skip(self))]
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        if self.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already requested");
            return ShutdownReport::default();
        }

        info!(grace_ms = grace.as_millis() as u64, "Initiating worker pool shutdown");
        *self.status.write() = PoolStatus::Draining;

        self.queue.close();
        self.shutdown_tx.send_replace(true);

        let deadline = tokio::time::Instant::now() + grace;
        let handles = std::mem::take(&mut *self.handles.lock());
        let mut report = ShutdownReport::default();

        for (device, mut handle) in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.graceful += 1,
                Ok(Err(e)) => {
                    error!(%device, error = %e, "Worker task ended abnormally");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(%device, "Worker did not stop within grace period, aborting");
                    handle.abort();
                    report.forced += 1;
                }
            }
        }

        let discarded = self.queue.drain();
        report.discarded = discarded.len();
        if !discarded.is_empty() {
            warn!(discarded = report.discarded, "Discarded queued tasks at shutdown");
        }

        for slot in &self.workers {
            if !slot
                .publication
                .halt_and_wait(self.config.forced_termination)
                .await
            {
                error!(
                    device = %slot.device,
                    "Publication still running after the forced-termination delay"
                );
                report.abandoned += 1;
            }
            slot.state.send_replace(WorkerState::Terminated);
        }
        *self.status.write() = PoolStatus::Stopped;

        info!(
            graceful = report.graceful,
            forced = report.forced,
            failed = report.failed,
            abandoned = report.abandoned,
            discarded = report.discarded,
            "Worker pool stopped"
        );
        report
    }

    /// Shut down with the configured grace period
    pub async fn shutdown_default(&self) -> ShutdownReport {
        self.shutdown(self.config.shutdown_timeout).await
    }

    pub fn status(&self) -> PoolStatus {
        *self.status.read()
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Number of workers (one per device)
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Current state of every worker, by device
    pub fn worker_states(&self) -> Vec<(DeviceId, WorkerState)> {
        self.workers
            .iter()
            .map(|slot| (slot.device, *slot.state.borrow()))
            .collect()
    }

    /// Workers that are ready or processing
    pub fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|slot| slot.state.borrow().is_live())
            .count()
    }

    /// Counters of every worker, by device
    pub fn stats(&self) -> Vec<(DeviceId, WorkerStatsSnapshot)> {
        self.workers
            .iter()
            .map(|slot| (slot.device, slot.stats.snapshot()))
            .collect()
    }

    /// Watch one worker's state transitions
    pub fn subscribe(&self, device: DeviceId) -> Result<watch::Receiver<WorkerState>, WorkerPoolError> {
        self.workers
            .iter()
            .find(|slot| slot.device == device)
            .map(|slot| slot.state.subscribe())
            .ok_or(WorkerPoolError::UnknownDevice(device))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers observe the signal (or the closed channel) and exit on
        // their own; nothing here waits for them.
        self.queue.close();
        self.shutdown_tx.send_replace(true);
        for slot in &self.workers {
            slot.publication.halt();
        }
    }
}
