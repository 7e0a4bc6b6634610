//! Compute backend seam
//!
//! The generative computation itself is opaque to the dispatch core. A
//! [`BackendLoader`] reports how many devices exist and initializes one
//! [`ComputeBackend`] per device; each backend is owned by exactly one worker
//! for its whole lifetime.
//!
//! Both traits are synchronous: workers call them from tokio's blocking pool.

mod pattern;

use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::task::TaskRecord;

pub use pattern::{PatternBackend, PatternLoader};

/// Identity of one compute device (its rank)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub fn rank(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a backend needs to produce one batch
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f64,
    pub seed: u64,
    pub batch_size: usize,
}

impl GenerationParams {
    pub fn from_task(task: &TaskRecord, negative_prompt: &str, batch_size: usize) -> Self {
        Self {
            prompt: task.prompt().to_string(),
            negative_prompt: negative_prompt.to_string(),
            width: task.width(),
            height: task.height(),
            steps: task.steps(),
            guidance: task.guidance(),
            seed: task.seed(),
            batch_size,
        }
    }
}

/// Backend failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The device cannot be used at all
    #[error("device {device} unavailable: {reason}")]
    DeviceUnavailable { device: DeviceId, reason: String },

    /// The model or runtime failed to load
    #[error("backend failed to load: {0}")]
    Load(String),

    /// A single generation failed
    #[error("generation failed: {0}")]
    Generation(String),
}

/// A loaded model bound to one device
pub trait ComputeBackend: Send + Sync {
    /// Version string; outputs are reproducible only within one version
    fn version(&self) -> &str;

    /// Produce `params.batch_size` encoded images.
    ///
    /// All randomness must come from `rng`, which the caller seeds from
    /// `params.seed`, so identical params yield identical bytes.
    fn generate(
        &self,
        params: &GenerationParams,
        rng: &mut StdRng,
    ) -> Result<Vec<Vec<u8>>, BackendError>;
}

/// Discovers devices and initializes a backend on each
pub trait BackendLoader: Send + Sync {
    /// Number of devices available to this process
    fn device_count(&self) -> usize;

    /// Initialize the backend for `device`. Failure is fatal to that device's worker.
    fn load(&self, device: DeviceId) -> Result<Arc<dyn ComputeBackend>, BackendError>;
}
