//! Worker lifecycle states and counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lifecycle of one device worker
///
/// ```text
/// Initializing ──► Ready ◄──► ProcessingTask
///      │             │              │
///      │             ▼              ▼
///      │        Terminating ◄───────┘
///      ▼             │
///  Terminated ◄──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Loading the backend onto the device
    Initializing,
    /// Waiting for the next task
    Ready,
    /// Running generation or publication for one task
    ProcessingTask,
    /// Shutdown observed; finishing up
    Terminating,
    /// Exited, either after shutdown or a failed initialization
    Terminated,
}

impl WorkerState {
    /// True while the worker can still take or finish a task
    pub fn is_live(&self) -> bool {
        matches!(self, WorkerState::Ready | WorkerState::ProcessingTask)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Initializing => "initializing",
            WorkerState::Ready => "ready",
            WorkerState::ProcessingTask => "processing_task",
            WorkerState::Terminating => "terminating",
            WorkerState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-worker counters, updated by the worker and read by anyone
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    faulted: AtomicU64,
    retried: AtomicU64,
    published: AtomicU64,
}

impl WorkerStats {
    pub(crate) fn task_completed(&self, published: usize) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.published.fetch_add(published as u64, Ordering::Relaxed);
    }

    pub(crate) fn task_faulted(&self) {
        self.faulted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn task_retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Tasks whose whole batch was published
    pub completed: u64,
    /// Tasks dropped after exhausting their attempts
    pub faulted: u64,
    /// Extra attempts made under the retry policy
    pub retried: u64,
    /// Images published
    pub published: u64,
}
