//! Artifact file naming
//!
//! Visible images are named `{w}x{h}_{seed}_{stamp}_g{device}_{index}.png` and
//! their metadata `<image name>.json`. Temporary files carry the same names
//! behind [`TEMP_PREFIX`] and are never listed or served.

use std::fmt;

use chrono::{DateTime, Utc};

use super::StoreError;
use crate::backend::DeviceId;

/// Marker prefix of in-flight files
pub const TEMP_PREFIX: &str = "tmp_";

/// Extension of visible images
pub const IMAGE_EXTENSION: &str = ".png";

/// Suffix appended to an image name to get its metadata name
pub const METADATA_SUFFIX: &str = ".json";

/// Timestamp layout embedded in names, millisecond resolution
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";

const MAX_NAME_LENGTH: usize = 255;

/// Name of one visible image in the output store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName(String);

/// Fields recoverable from a name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodedName {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub seed: Option<u64>,
}

impl ArtifactName {
    /// Name for output `index` of a batch completed at `stamp` on `device`
    pub fn for_output(
        width: u32,
        height: u32,
        seed: u64,
        stamp: DateTime<Utc>,
        device: DeviceId,
        index: usize,
    ) -> Self {
        Self(format!(
            "{width}x{height}_{seed}_{}_g{device}_{index}{IMAGE_EXTENSION}",
            stamp.format(STAMP_FORMAT)
        ))
    }

    /// Validate a client-supplied name.
    ///
    /// Accepts a single path component made of ASCII letters, digits, `.`,
    /// `_` and `-`; rejects traversal, hidden files and temporary names.
    pub fn parse(name: &str) -> Result<Self, StoreError> {
        let invalid = || StoreError::InvalidName(name.to_string());

        if name.is_empty() || name.len() > MAX_NAME_LENGTH {
            return Err(invalid());
        }
        if name.starts_with('.') || name.contains("..") || name.starts_with(TEMP_PREFIX) {
            return Err(invalid());
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(invalid());
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn metadata_name(&self) -> String {
        format!("{}{METADATA_SUFFIX}", self.0)
    }

    pub fn temp_image_name(&self) -> String {
        format!("{TEMP_PREFIX}{}", self.0)
    }

    pub fn temp_metadata_name(&self) -> String {
        format!("{TEMP_PREFIX}{}{METADATA_SUFFIX}", self.0)
    }

    /// Recover dimensions and seed from the name; unknown parts stay `None`
    pub fn decode(&self) -> DecodedName {
        let mut parts = self.0.split('_');
        let mut decoded = DecodedName::default();

        if let Some((w, h)) = parts.next().and_then(|dims| dims.split_once('x')) {
            decoded.width = w.parse().ok();
            decoded.height = h.parse().ok();
        }
        decoded.seed = parts.next().and_then(|seed| seed.parse().ok());
        decoded
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True for names the store lists as published images
pub fn is_visible_image(name: &str) -> bool {
    name.ends_with(IMAGE_EXTENSION) && !name.starts_with(TEMP_PREFIX)
}

/// True for leftovers of an interrupted publication
pub fn is_temporary(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 13, 45, 7).unwrap()
            + chrono::Duration::milliseconds(123)
    }

    #[test]
    fn test_output_name_layout() {
        let name = ArtifactName::for_output(1024, 768, 42, stamp(), DeviceId(1), 3);

        assert_eq!(name.as_str(), "1024x768_42_20261019134507123_g1_3.png");
        assert_eq!(
            name.metadata_name(),
            "1024x768_42_20261019134507123_g1_3.png.json"
        );
        assert_eq!(
            name.temp_image_name(),
            "tmp_1024x768_42_20261019134507123_g1_3.png"
        );
        assert!(is_visible_image(name.as_str()));
        assert!(!is_visible_image(&name.temp_image_name()));
        assert!(!is_visible_image(&name.metadata_name()));
    }

    #[test]
    fn test_decode_roundtrips_encoded_fields() {
        let name = ArtifactName::for_output(512, 256, 9, stamp(), DeviceId(0), 0);
        let decoded = name.decode();

        assert_eq!(decoded.width, Some(512));
        assert_eq!(decoded.height, Some(256));
        assert_eq!(decoded.seed, Some(9));
    }

    #[test]
    fn test_decode_foreign_name() {
        let name = ArtifactName::parse("holiday.png").unwrap();
        assert_eq!(name.decode(), DecodedName::default());
    }

    #[test]
    fn test_parse_rejects_unsafe_names() {
        for bad in [
            "",
            "../etc/passwd",
            "a/b.png",
            "a\\b.png",
            ".hidden.png",
            "tmp_1x1_1_1_g0_0.png",
            "with space.png",
            "..",
        ] {
            assert!(ArtifactName::parse(bad).is_err(), "accepted {bad:?}");
        }
        assert!(ArtifactName::parse("512x512_1_20261019134507123_g0_0.png").is_ok());
    }
}
