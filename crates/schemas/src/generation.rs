// Generation request and admission result types
//
// The request mirrors what clients send: every field is optional and numeric
// fields may arrive as JSON numbers or numeric strings. Normalization and
// bounds checking happen in the admission gate, not here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Raw generation request as submitted by a client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct GenerateRequest {
    /// Text prompt. Truncated to the configured maximum length and trimmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, example = "a cat"))]
    pub prompt: Option<Value>,
    /// Output width in pixels. Clamped and rounded down to a multiple of 8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>, example = 1024))]
    pub width: Option<Value>,
    /// Output height in pixels. Clamped and rounded down to a multiple of 8.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>, example = 1024))]
    pub height: Option<Value>,
    /// Number of inference steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>, example = 4))]
    pub steps: Option<Value>,
    /// Guidance scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<f64>, example = 0.0))]
    pub cfg: Option<Value>,
    /// Seed. Omitted or -1 draws a random seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<i64>, example = 42))]
    pub seed: Option<Value>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(Value::String(prompt.into())),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, width: i64, height: i64) -> Self {
        self.width = Some(Value::from(width));
        self.height = Some(Value::from(height));
        self
    }

    pub fn with_steps(mut self, steps: i64) -> Self {
        self.steps = Some(Value::from(steps));
        self
    }

    pub fn with_cfg(mut self, cfg: f64) -> Self {
        self.cfg = Some(Value::from(cfg));
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(Value::from(seed));
        self
    }
}

/// Why a submission was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum AdmissionReason {
    /// The task queue is at capacity.
    QueueFull,
    /// The prompt is empty after trimming.
    EmptyPrompt,
    /// A numeric field could not be parsed.
    InvalidType,
    /// The service is shutting down and no longer admits work.
    ShuttingDown,
}

impl AdmissionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionReason::QueueFull => "QueueFull",
            AdmissionReason::EmptyPrompt => "EmptyPrompt",
            AdmissionReason::InvalidType => "InvalidType",
            AdmissionReason::ShuttingDown => "ShuttingDown",
        }
    }
}

impl fmt::Display for AdmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response body for an admitted task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct GenerateAccepted {
    /// Always "ok".
    #[cfg_attr(feature = "openapi", schema(example = "ok"))]
    pub status: String,
    /// Seed the task will run with (drawn at admission when not supplied).
    pub seed: u64,
    /// Normalized width.
    pub width: u32,
    /// Normalized height.
    pub height: u32,
    /// Queue depth right after this task was admitted (1 = next in line).
    pub queue_position: usize,
}

impl GenerateAccepted {
    pub fn new(seed: u64, width: u32, height: u32, queue_position: usize) -> Self {
        Self {
            status: "ok".to_string(),
            seed,
            width,
            height,
            queue_position,
        }
    }
}
