//! # Task Dispatch Engine
//!
//! Bounded admission, per-device execution and atomic publication of image
//! generation tasks.
//!
//! ## Features
//!
//! - **Bounded queue**: a fixed-capacity FIFO is the only buffer; producers are
//!   rejected, never blocked, when it is full
//! - **Admission gate**: requests are normalized into immutable task records
//!   before they touch the queue
//! - **Device workers**: one worker per compute device, with per-task fault
//!   isolation and a cooldown after faults
//! - **Atomic publication**: images and metadata are written under temporary
//!   names and renamed into place
//! - **Bounded shutdown**: signal, wait up to a grace period, abort the rest,
//!   then let any half-written batch stop at an artifact boundary
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      AdmissionGate                           │
//! │  (capacity check, prompt check, numeric parsing/clamping)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ try_enqueue
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TaskQueue                             │
//! │  (bounded FIFO, closed by the supervisor at shutdown)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ dequeue
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                             │
//! │  (one DeviceWorker per device, ComputeBackend per worker)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ publish_batch
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ArtifactStore                           │
//! │  (tmp_ write, rename into place; listing and metadata)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use genpool_dispatch::prelude::*;
//!
//! let queue = Arc::new(TaskQueue::new(100));
//! let gate = AdmissionGate::new(Arc::clone(&queue), AdmissionLimits::default());
//! let pool = WorkerPool::start(
//!     WorkerPoolConfig::default(),
//!     Arc::new(PatternLoader::new(1)),
//!     Arc::clone(&queue),
//!     ArtifactStore::new("./img"),
//! )?;
//!
//! let admitted = gate.submit(&GenerateRequest::new("a lighthouse at dusk"))?;
//! println!("queued at position {}", admitted.queue_position);
//!
//! pool.shutdown(Duration::from_secs(5)).await;
//! ```

pub mod admission;
pub mod backend;
pub mod queue;
pub mod reliability;
pub mod store;
pub mod task;
pub mod worker;

pub use admission::{AdmissionGate, AdmissionLimits, AdmissionRejection, Admitted, InvalidLimits};
pub use backend::{
    BackendError, BackendLoader, ComputeBackend, DeviceId, GenerationParams, PatternBackend,
    PatternLoader,
};
pub use queue::{EnqueueError, TaskQueue};
pub use reliability::RetryPolicy;
pub use store::{ArtifactName, ArtifactStore, PendingArtifact, StoreError};
pub use task::TaskRecord;
pub use worker::{
    PoolStatus, ShutdownReport, TaskError, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    WorkerState, WorkerStatsSnapshot,
};

/// Prelude for common imports
pub mod prelude {
    pub use crate::admission::{AdmissionGate, AdmissionLimits, AdmissionRejection, Admitted};
    pub use crate::backend::{BackendLoader, ComputeBackend, DeviceId, PatternLoader};
    pub use crate::queue::TaskQueue;
    pub use crate::reliability::RetryPolicy;
    pub use crate::store::{ArtifactName, ArtifactStore, StoreError};
    pub use crate::worker::{ShutdownReport, WorkerPool, WorkerPoolConfig, WorkerState};
    pub use genpool_schemas::GenerateRequest;
    pub use std::sync::Arc;
    pub use std::time::Duration;
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
