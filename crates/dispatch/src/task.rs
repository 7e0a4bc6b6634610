//! Task records
//!
//! A [`TaskRecord`] is the unit of work handed from the admission gate to a
//! device worker. Records are only constructed by the gate after every bound
//! has been applied, and they are never mutated once enqueued.

use serde::Serialize;

/// Pixel alignment required by the compute backend.
pub const DIMENSION_ALIGNMENT: u32 = 8;

/// A validated, normalized generation task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    prompt: String,
    width: u32,
    height: u32,
    seed: u64,
    steps: u32,
    guidance: f64,
}

impl TaskRecord {
    pub(crate) fn new(
        prompt: String,
        width: u32,
        height: u32,
        seed: u64,
        steps: u32,
        guidance: f64,
    ) -> Self {
        debug_assert!(width % DIMENSION_ALIGNMENT == 0 && height % DIMENSION_ALIGNMENT == 0);
        Self {
            prompt,
            width,
            height,
            seed,
            steps,
            guidance,
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn guidance(&self) -> f64 {
        self.guidance
    }
}
