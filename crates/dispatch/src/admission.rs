//! Admission gate
//!
//! Turns a raw [`GenerateRequest`] into a [`TaskRecord`] and places it on the
//! [`TaskQueue`], or rejects it before it consumes any shared resource.
//!
//! Checks run in a fixed order: queue capacity, prompt, numeric fields.
//! Out-of-range numbers are clamped rather than rejected; only values that
//! cannot be read as numbers at all are refused.

use std::sync::Arc;

use genpool_schemas::{AdmissionReason, GenerateRequest};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::queue::{EnqueueError, TaskQueue};
use crate::task::{TaskRecord, DIMENSION_ALIGNMENT};

/// Seed value meaning "draw one at random"
pub const RANDOM_SEED: i64 = -1;

/// Rejection returned to the submitter
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejection {
    #[error("queue is full, try again later")]
    QueueFull,

    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("invalid value for field `{field}`")]
    InvalidType { field: &'static str },

    #[error("service is shutting down")]
    ShuttingDown,
}

impl AdmissionRejection {
    pub fn reason(&self) -> AdmissionReason {
        match self {
            AdmissionRejection::QueueFull => AdmissionReason::QueueFull,
            AdmissionRejection::EmptyPrompt => AdmissionReason::EmptyPrompt,
            AdmissionRejection::InvalidType { .. } => AdmissionReason::InvalidType,
            AdmissionRejection::ShuttingDown => AdmissionReason::ShuttingDown,
        }
    }
}

impl From<EnqueueError> for AdmissionRejection {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Full => AdmissionRejection::QueueFull,
            EnqueueError::Closed => AdmissionRejection::ShuttingDown,
        }
    }
}

/// Invalid limit configuration
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid admission limits: {0}")]
pub struct InvalidLimits(String);

/// Bounds applied to every submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdmissionLimits {
    pub min_resolution: u32,
    pub max_resolution: u32,
    pub max_steps: u32,
    pub max_guidance: f64,
    /// Maximum prompt length in characters
    pub max_prompt_length: usize,
    pub default_width: u32,
    pub default_height: u32,
    pub default_steps: u32,
    pub default_guidance: f64,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            min_resolution: 256,
            max_resolution: 2048,
            max_steps: 20,
            max_guidance: 20.0,
            max_prompt_length: 1000,
            default_width: 1024,
            default_height: 1024,
            default_steps: 4,
            default_guidance: 0.0,
        }
    }
}

impl AdmissionLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inclusive resolution range for width and height
    pub fn with_resolution(mut self, min: u32, max: u32) -> Self {
        self.min_resolution = min;
        self.max_resolution = max;
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_max_guidance(mut self, max_guidance: f64) -> Self {
        self.max_guidance = max_guidance;
        self
    }

    pub fn with_max_prompt_length(mut self, max_prompt_length: usize) -> Self {
        self.max_prompt_length = max_prompt_length;
        self
    }

    /// Validate the configuration
    ///
    /// The minimum resolution must itself be aligned, otherwise rounding a
    /// clamped value down could fall below it.
    pub fn validate(&self) -> Result<(), InvalidLimits> {
        if self.min_resolution == 0 || self.min_resolution % DIMENSION_ALIGNMENT != 0 {
            return Err(InvalidLimits(format!(
                "min_resolution must be a positive multiple of {DIMENSION_ALIGNMENT}"
            )));
        }
        if self.min_resolution > self.max_resolution {
            return Err(InvalidLimits(
                "min_resolution must not exceed max_resolution".into(),
            ));
        }
        if self.max_steps == 0 {
            return Err(InvalidLimits("max_steps must be at least 1".into()));
        }
        if !self.max_guidance.is_finite() || self.max_guidance < 0.0 {
            return Err(InvalidLimits(
                "max_guidance must be a non-negative number".into(),
            ));
        }
        if self.max_prompt_length == 0 {
            return Err(InvalidLimits("max_prompt_length must be at least 1".into()));
        }
        Ok(())
    }

    fn clamp_dimension(&self, value: i64) -> u32 {
        let clamped = value.clamp(
            i64::from(self.min_resolution),
            i64::from(self.max_resolution),
        ) as u32;
        clamped - clamped % DIMENSION_ALIGNMENT
    }
}

/// Summary of an admitted task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub seed: u64,
    pub width: u32,
    pub height: u32,
    /// Queue depth including this task
    pub queue_position: usize,
}

/// The single entry point for new work
pub struct AdmissionGate {
    queue: Arc<TaskQueue>,
    limits: AdmissionLimits,
}

impl AdmissionGate {
    pub fn new(queue: Arc<TaskQueue>, limits: AdmissionLimits) -> Self {
        Self { queue, limits }
    }

    pub fn limits(&self) -> &AdmissionLimits {
        &self.limits
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Validate and enqueue a request
    pub fn submit(&self, request: &GenerateRequest) -> Result<Admitted, AdmissionRejection> {
        if self.queue.is_closed() {
            return Err(AdmissionRejection::ShuttingDown);
        }
        if self.queue.is_full() {
            debug!(capacity = self.queue.capacity(), "Rejecting submission, queue full");
            return Err(AdmissionRejection::QueueFull);
        }

        let task = self.normalize(request)?;
        let admitted = Admitted {
            seed: task.seed(),
            width: task.width(),
            height: task.height(),
            queue_position: 0,
        };

        // Capacity may have been taken by a concurrent producer since the
        // check above; the queue itself has the final word.
        let queue_position = self.queue.try_enqueue(task).map_err(|e| {
            debug!(error = %e, "Rejecting submission at enqueue");
            AdmissionRejection::from(e)
        })?;

        debug!(
            seed = admitted.seed,
            width = admitted.width,
            height = admitted.height,
            queue_position,
            "Task admitted"
        );

        Ok(Admitted {
            queue_position,
            ..admitted
        })
    }

    /// Build a task record from a request without touching the queue
    pub fn normalize(&self, request: &GenerateRequest) -> Result<TaskRecord, AdmissionRejection> {
        let limits = &self.limits;

        let prompt = prompt_text(request.prompt.as_ref());
        let prompt: String = prompt.chars().take(limits.max_prompt_length).collect();
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AdmissionRejection::EmptyPrompt);
        }

        let width = parse_integer(
            request.width.as_ref(),
            i64::from(limits.default_width),
            "width",
        )?;
        let height = parse_integer(
            request.height.as_ref(),
            i64::from(limits.default_height),
            "height",
        )?;
        let steps = parse_integer(
            request.steps.as_ref(),
            i64::from(limits.default_steps),
            "steps",
        )?;
        let guidance = parse_float(request.cfg.as_ref(), limits.default_guidance, "cfg")?;
        let seed = parse_seed(request.seed.as_ref())?;

        let width = limits.clamp_dimension(width);
        let height = limits.clamp_dimension(height);
        let steps = steps.clamp(1, i64::from(limits.max_steps)) as u32;
        let guidance = guidance.clamp(0.0, limits.max_guidance);
        let seed = seed.unwrap_or_else(random_seed);

        Ok(TaskRecord::new(
            prompt.to_string(),
            width,
            height,
            seed,
            steps,
            guidance,
        ))
    }
}

/// Uniform seed in [0, 2^32 - 1]
fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..=u64::from(u32::MAX))
}

fn prompt_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn parse_integer(
    value: Option<&Value>,
    default: i64,
    field: &'static str,
) -> Result<i64, AdmissionRejection> {
    let invalid = AdmissionRejection::InvalidType { field };
    match value {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .ok_or(invalid),
        Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid),
        Some(_) => Err(invalid),
    }
}

fn parse_float(
    value: Option<&Value>,
    default: f64,
    field: &'static str,
) -> Result<f64, AdmissionRejection> {
    let invalid = AdmissionRejection::InvalidType { field };
    let parsed = match value {
        None | Some(Value::Null) => return Ok(default),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    parsed.filter(|f| f.is_finite()).ok_or(invalid)
}

/// `Ok(None)` means a random seed was requested
fn parse_seed(value: Option<&Value>) -> Result<Option<u64>, AdmissionRejection> {
    let invalid = AdmissionRejection::InvalidType { field: "seed" };
    let raw: i128 = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => {
            if let Some(u) = n.as_u64() {
                i128::from(u)
            } else if let Some(i) = n.as_i64() {
                i128::from(i)
            } else {
                match n.as_f64().filter(|f| f.is_finite()) {
                    Some(f) => f.trunc() as i128,
                    None => return Err(invalid),
                }
            }
        }
        Some(Value::String(s)) => s.trim().parse::<i128>().map_err(|_| invalid.clone())?,
        Some(_) => return Err(invalid),
    };

    if raw == i128::from(RANDOM_SEED) {
        return Ok(None);
    }
    u64::try_from(raw).map(Some).map_err(|_| invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn gate(capacity: usize) -> AdmissionGate {
        AdmissionGate::new(Arc::new(TaskQueue::new(capacity)), AdmissionLimits::default())
    }

    fn request(value: Value) -> GenerateRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let task = gate(4)
            .normalize(&request(json!({"prompt": "a cat", "seed": 5})))
            .unwrap();

        assert_eq!(task.width(), 1024);
        assert_eq!(task.height(), 1024);
        assert_eq!(task.steps(), 4);
        assert_eq!(task.guidance(), 0.0);
        assert_eq!(task.seed(), 5);
    }

    #[test]
    fn test_dimensions_round_down_to_alignment() {
        let task = gate(4)
            .normalize(&request(json!({"prompt": "x", "width": 1001, "height": 1000})))
            .unwrap();

        assert_eq!(task.width(), 1000);
        assert_eq!(task.height(), 1000);
    }

    #[test]
    fn test_dimensions_clamped_to_range() {
        let task = gate(4)
            .normalize(&request(json!({"prompt": "x", "width": 10, "height": 99999})))
            .unwrap();

        assert_eq!(task.width(), 256);
        assert_eq!(task.height(), 2048);
    }

    #[test]
    fn test_steps_and_guidance_clamped() {
        let task = gate(4)
            .normalize(&request(json!({"prompt": "x", "steps": 500, "cfg": -3.0})))
            .unwrap();
        assert_eq!(task.steps(), 20);
        assert_eq!(task.guidance(), 0.0);

        let task = gate(4)
            .normalize(&request(json!({"prompt": "x", "steps": 0, "cfg": 99.5})))
            .unwrap();
        assert_eq!(task.steps(), 1);
        assert_eq!(task.guidance(), 20.0);
    }

    #[test]
    fn test_numeric_strings_accepted() {
        let task = gate(4)
            .normalize(&request(json!({
                "prompt": "x",
                "width": " 512 ",
                "steps": "8",
                "cfg": "2.5",
                "seed": "42"
            })))
            .unwrap();

        assert_eq!(task.width(), 512);
        assert_eq!(task.steps(), 8);
        assert_eq!(task.guidance(), 2.5);
        assert_eq!(task.seed(), 42);
    }

    #[test]
    fn test_invalid_types_rejected() {
        let g = gate(4);

        assert_eq!(
            g.normalize(&request(json!({"prompt": "x", "width": "wide"}))),
            Err(AdmissionRejection::InvalidType { field: "width" })
        );
        assert_eq!(
            g.normalize(&request(json!({"prompt": "x", "steps": [1]}))),
            Err(AdmissionRejection::InvalidType { field: "steps" })
        );
        assert_eq!(
            g.normalize(&request(json!({"prompt": "x", "cfg": "NaN"}))),
            Err(AdmissionRejection::InvalidType { field: "cfg" })
        );
        assert_eq!(
            g.normalize(&request(json!({"prompt": "x", "seed": -7}))),
            Err(AdmissionRejection::InvalidType { field: "seed" })
        );
    }

    #[test]
    fn test_whitespace_prompt_rejected() {
        assert_eq!(
            gate(4).normalize(&request(json!({"prompt": "   "}))),
            Err(AdmissionRejection::EmptyPrompt)
        );
        assert_eq!(
            gate(4).normalize(&request(json!({}))),
            Err(AdmissionRejection::EmptyPrompt)
        );
    }

    #[test]
    fn test_prompt_truncated_then_trimmed() {
        let limits = AdmissionLimits::default().with_max_prompt_length(6);
        let g = AdmissionGate::new(Arc::new(TaskQueue::new(4)), limits);

        let task = g
            .normalize(&request(json!({"prompt": "  cat and dog"})))
            .unwrap();
        assert_eq!(task.prompt(), "cat");
    }

    #[test]
    fn test_random_seed_within_u32_range() {
        let g = gate(4);
        for value in [json!({"prompt": "x"}), json!({"prompt": "x", "seed": -1})] {
            let task = g.normalize(&request(value)).unwrap();
            assert!(task.seed() <= u64::from(u32::MAX));
        }
    }

    #[test]
    fn test_large_explicit_seed_kept() {
        let task = gate(4)
            .normalize(&request(json!({"prompt": "x", "seed": u64::MAX})))
            .unwrap();
        assert_eq!(task.seed(), u64::MAX);
    }

    #[test]
    fn test_queue_full_checked_before_prompt() {
        let g = gate(1);
        g.submit(&GenerateRequest::new("first")).unwrap();

        assert_eq!(
            g.submit(&request(json!({"prompt": "  "}))),
            Err(AdmissionRejection::QueueFull)
        );
    }

    #[test]
    fn test_closed_queue_rejects_with_shutting_down() {
        let g = gate(4);
        g.queue().close();

        assert_eq!(
            g.submit(&GenerateRequest::new("x")),
            Err(AdmissionRejection::ShuttingDown)
        );
    }

    #[test]
    fn test_submit_reports_position() {
        let g = gate(4);
        let first = g.submit(&GenerateRequest::new("a")).unwrap();
        let second = g.submit(&GenerateRequest::new("b").with_seed(3)).unwrap();

        assert_eq!(first.queue_position, 1);
        assert_eq!(second.queue_position, 2);
        assert_eq!(second.seed, 3);
    }

    #[test]
    fn test_limits_validation() {
        assert!(AdmissionLimits::default().validate().is_ok());
        assert!(AdmissionLimits::default()
            .with_resolution(250, 2048)
            .validate()
            .is_err());
        assert!(AdmissionLimits::default()
            .with_resolution(512, 256)
            .validate()
            .is_err());
        assert!(AdmissionLimits::default().with_max_steps(0).validate().is_err());
    }
}
