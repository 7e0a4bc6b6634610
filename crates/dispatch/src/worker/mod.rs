//! Device workers and their supervisor
//!
//! This module provides:
//! - [`WorkerPool`] - spawns one worker per device and owns shutdown
//! - [`WorkerState`] - observable lifecycle of each worker
//! - [`TaskError`] - per-task faults, contained inside the worker
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       WorkerPool                          │
//! │   shutdown: watch<bool>         handles: JoinHandle[]     │
//! │                                                           │
//! │  ┌───────────────┐  ┌───────────────┐  ┌───────────────┐  │
//! │  │ DeviceWorker  │  │ DeviceWorker  │  │ DeviceWorker  │  │
//! │  │   device 0    │  │   device 1    │  │   device N    │  │
//! │  └───────┬───────┘  └───────┬───────┘  └───────┬───────┘  │
//! └──────────┼──────────────────┼──────────────────┼──────────┘
//!            │    dequeue       │                  │
//!            ▼                  ▼                  ▼
//!      ┌──────────────────────────────────────────────────┐
//!      │                    TaskQueue                      │
//!      └──────────────────────────────────────────────────┘
//!            │ generate (blocking pool)
//!            ▼
//!      ComputeBackend ──► ArtifactStore::publish_batch (blocking pool)
//! ```

mod device;
mod pool;
mod state;

pub use device::TaskError;
pub use pool::{
    PoolStatus, ShutdownReport, WorkerPool, WorkerPoolConfig, WorkerPoolError,
    DEFAULT_NEGATIVE_PROMPT,
};
pub use state::{WorkerState, WorkerStats, WorkerStatsSnapshot};
