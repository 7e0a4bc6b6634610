// Published artifact types
//
// Each completed task yields a batch of images. Every image has a sibling
// metadata record stored next to it as `<image name>.json`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Prompt value reported when an artifact's metadata file is missing or unreadable.
pub const METADATA_LOST: &str = "<metadata lost>";

/// Metadata written alongside every published image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ArtifactMetadata {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub seed: u64,
    pub steps: u32,
    /// Guidance scale, named `cfg` on the wire like the request field.
    #[serde(rename = "cfg")]
    pub guidance: f64,
    /// When the producing worker completed the task.
    pub timestamp: DateTime<Utc>,
    /// Rank of the device that produced the image.
    pub device: u32,
    /// Position of the image within its batch.
    pub index: u32,
}

/// Metadata recovered from an artifact's file name after its record was lost.
///
/// Only the fields encoded in the name can be recovered; `prompt` is always
/// [`METADATA_LOST`] and `steps` is always absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ReconstructedMetadata {
    pub prompt: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seed: Option<u64>,
    pub steps: Option<u32>,
    pub metadata_lost: bool,
}

impl ReconstructedMetadata {
    pub fn new(width: Option<u32>, height: Option<u32>, seed: Option<u64>) -> Self {
        Self {
            prompt: METADATA_LOST.to_string(),
            width,
            height,
            seed,
            steps: None,
            metadata_lost: true,
        }
    }
}

/// Metadata served for an artifact: either the recorded file or a reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(untagged)]
pub enum MetadataRecord {
    Recorded(ArtifactMetadata),
    Reconstructed(ReconstructedMetadata),
}

impl MetadataRecord {
    /// True when the metadata file was missing or corrupt.
    pub fn is_lost(&self) -> bool {
        matches!(self, MetadataRecord::Reconstructed(_))
    }
}

/// Service counters for dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StatsResponse {
    /// Tasks waiting in the queue.
    pub queue: usize,
    /// Published images in the output store.
    pub total: usize,
    /// Device workers currently alive.
    pub workers: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_uses_cfg_on_the_wire() {
        let meta = ArtifactMetadata {
            prompt: "a cat".into(),
            width: 1024,
            height: 768,
            seed: 42,
            steps: 4,
            guidance: 0.0,
            timestamp: Utc::now(),
            device: 1,
            index: 3,
        };

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["cfg"], json!(0.0));
        assert!(value.get("guidance").is_none());
    }

    #[test]
    fn test_untagged_record_prefers_recorded_shape() {
        let value = json!({
            "prompt": "a cat",
            "width": 512,
            "height": 512,
            "seed": 7,
            "steps": 4,
            "cfg": 0.0,
            "timestamp": "2026-10-19T12:00:00Z",
            "device": 0,
            "index": 0
        });

        let record: MetadataRecord = serde_json::from_value(value).unwrap();
        assert!(!record.is_lost());
    }

    #[test]
    fn test_reconstructed_carries_sentinel() {
        let record = MetadataRecord::Reconstructed(ReconstructedMetadata::new(
            Some(512),
            Some(256),
            Some(9),
        ));
        let value = serde_json::to_value(&record).unwrap();

        assert!(record.is_lost());
        assert_eq!(value["prompt"], json!(METADATA_LOST));
        assert_eq!(value["metadata_lost"], json!(true));
        assert_eq!(value["steps"], json!(null));
    }
}
