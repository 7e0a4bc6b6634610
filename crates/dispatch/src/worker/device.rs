//! Device worker
//!
//! One async task per device. The worker loads its backend once, then loops:
//! take the oldest task, generate a batch on the blocking pool, publish it on
//! the blocking pool, repeat. Any failure inside that loop is confined to the
//! task that caused it.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use genpool_schemas::ArtifactMetadata;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinError;
use tracing::{debug, error, info, instrument, warn};

use super::pool::WorkerPoolConfig;
use super::state::{WorkerState, WorkerStats};
use crate::backend::{BackendError, BackendLoader, ComputeBackend, DeviceId, GenerationParams};
use crate::queue::TaskQueue;
use crate::store::{ArtifactName, ArtifactStore, PendingArtifact, StoreError};
use crate::task::TaskRecord;

/// Failure of one unit of work on a worker
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("publication failed: {0}")]
    Publish(#[from] StoreError),

    #[error("backend returned no images")]
    EmptyBatch,

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("blocking work was cancelled")]
    Cancelled,
}

impl From<JoinError> for TaskError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            TaskError::Panicked(panic_message(err.into_panic()))
        } else {
            TaskError::Cancelled
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The publication a worker has handed to the blocking pool.
///
/// Aborting a worker drops its async future but not a blocking job that is
/// already renaming files, so the pool uses this slot to halt that job
/// between artifacts and to wait until it has let go.
#[derive(Debug, Default)]
pub(crate) struct PublicationSlot {
    in_flight: Arc<Mutex<()>>,
    halted: AtomicBool,
}

impl PublicationSlot {
    pub(crate) fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Stop publication after the artifact being written
    pub(crate) fn halt(&self) {
        self.halted.store(true, Ordering::Release);
    }

    /// Halt, then wait up to `limit` for the blocking job to finish. False
    /// if it is still running.
    pub(crate) async fn halt_and_wait(&self, limit: Duration) -> bool {
        self.halt();
        tokio::time::timeout(limit, self.in_flight.lock())
            .await
            .is_ok()
    }
}

pub(crate) struct DeviceWorker {
    device: DeviceId,
    loader: Arc<dyn BackendLoader>,
    queue: Arc<TaskQueue>,
    store: ArtifactStore,
    config: Arc<WorkerPoolConfig>,
    state: Arc<watch::Sender<WorkerState>>,
    stats: Arc<WorkerStats>,
    publication: Arc<PublicationSlot>,
    shutdown_rx: watch::Receiver<bool>,
    last_stamp: Option<DateTime<Utc>>,
}

impl DeviceWorker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        device: DeviceId,
        loader: Arc<dyn BackendLoader>,
        queue: Arc<TaskQueue>,
        store: ArtifactStore,
        config: Arc<WorkerPoolConfig>,
        state: Arc<watch::Sender<WorkerState>>,
        stats: Arc<WorkerStats>,
        publication: Arc<PublicationSlot>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            device,
            loader,
            queue,
            store,
            config,
            state,
            stats,
            publication,
            shutdown_rx,
            last_stamp: None,
        }
    }

    #[instrument(name = "device_worker", skip(self), fields(device = %self.device))]
    pub(crate) async fn run(mut self) {
        self.set_state(WorkerState::Initializing);

        let backend = match self.initialize().await {
            Ok(backend) => backend,
            Err(e) => {
                error!(fault = "init", error = %e, "Backend initialization failed, worker exiting");
                self.set_state(WorkerState::Terminated);
                return;
            }
        };
        info!(version = backend.version(), "Worker ready");

        loop {
            self.set_state(WorkerState::Ready);

            let task = tokio::select! {
                biased;
                _ = self.shutdown_rx.wait_for(|stop| *stop) => break,
                task = self.queue.dequeue() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            self.set_state(WorkerState::ProcessingTask);
            match self.process(&backend, &task).await {
                Ok(published) => {
                    self.stats.task_completed(published);
                    info!(
                        seed = task.seed(),
                        width = task.width(),
                        height = task.height(),
                        published,
                        "Task completed"
                    );
                }
                Err(e) => {
                    self.stats.task_faulted();
                    error!(
                        fault = "task",
                        seed = task.seed(),
                        width = task.width(),
                        height = task.height(),
                        error = %e,
                        "Task dropped"
                    );
                    if self.pause(self.config.fault_cooldown).await {
                        break;
                    }
                }
            }
        }

        self.set_state(WorkerState::Terminating);
        drop(backend);
        let stats = self.stats.snapshot();
        info!(
            completed = stats.completed,
            faulted = stats.faulted,
            "Worker stopped"
        );
        self.set_state(WorkerState::Terminated);
    }

    async fn initialize(&self) -> Result<Arc<dyn ComputeBackend>, TaskError> {
        let loader = Arc::clone(&self.loader);
        let device = self.device;
        let backend = tokio::task::spawn_blocking(move || loader.load(device)).await??;
        Ok(backend)
    }

    /// Run a task under the retry policy; returns the number of published images
    async fn process(
        &mut self,
        backend: &Arc<dyn ComputeBackend>,
        task: &TaskRecord,
    ) -> Result<usize, TaskError> {
        let retry = self.config.retry.clone();
        let mut attempt = 1;

        loop {
            match self.attempt(backend, task).await {
                Ok(published) => return Ok(published),
                Err(e) if retry.has_attempts_remaining(attempt) => {
                    let delay = retry.delay_for_attempt(attempt + 1);
                    warn!(
                        fault = "task",
                        seed = task.seed(),
                        attempt,
                        max_attempts = retry.max_attempts,
                        error = %e,
                        "Task attempt failed, retrying in {:?}",
                        delay
                    );
                    if self.pause(delay).await {
                        return Err(e);
                    }
                    self.stats.task_retried();
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &mut self,
        backend: &Arc<dyn ComputeBackend>,
        task: &TaskRecord,
    ) -> Result<usize, TaskError> {
        let params = GenerationParams::from_task(
            task,
            &self.config.negative_prompt,
            self.config.batch_size,
        );

        let backend = Arc::clone(backend);
        let images = tokio::task::spawn_blocking(move || {
            let mut rng = StdRng::seed_from_u64(params.seed);
            backend.generate(&params, &mut rng)
        })
        .await??;

        if images.is_empty() {
            return Err(TaskError::EmptyBatch);
        }
        if images.len() != self.config.batch_size {
            debug!(
                expected = self.config.batch_size,
                actual = images.len(),
                "Backend returned a short batch"
            );
        }

        let stamp = self.next_stamp();
        let batch: Vec<PendingArtifact> = images
            .into_iter()
            .enumerate()
            .map(|(index, image)| self.artifact(task, stamp, index, image))
            .collect();

        // The permit travels with the blocking job and is released when it
        // returns or unwinds, even if this future is aborted meanwhile.
        let permit = Arc::clone(&self.publication.in_flight).lock_owned().await;
        let publication = Arc::clone(&self.publication);
        let store = self.store.clone();
        let published = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            store.publish_batch_while(&batch, || !publication.is_halted())
        })
        .await??;
        Ok(published)
    }

    fn artifact(
        &self,
        task: &TaskRecord,
        stamp: DateTime<Utc>,
        index: usize,
        image: Vec<u8>,
    ) -> PendingArtifact {
        PendingArtifact {
            name: ArtifactName::for_output(
                task.width(),
                task.height(),
                task.seed(),
                stamp,
                self.device,
                index,
            ),
            image,
            metadata: ArtifactMetadata {
                prompt: task.prompt().to_string(),
                width: task.width(),
                height: task.height(),
                seed: task.seed(),
                steps: task.steps(),
                guidance: task.guidance(),
                timestamp: stamp,
                device: self.device.rank(),
                index: index as u32,
            },
        }
    }

    /// Millisecond stamp, strictly increasing for this worker
    fn next_stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(3);
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    /// Sleep for `delay` unless shutdown arrives first; true on shutdown
    async fn pause(&mut self, delay: Duration) -> bool {
        if delay.is_zero() {
            return *self.shutdown_rx.borrow();
        }
        tokio::select! {
            biased;
            _ = self.shutdown_rx.wait_for(|stop| *stop) => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    fn set_state(&self, state: WorkerState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Worker state changed");
        }
    }
}
