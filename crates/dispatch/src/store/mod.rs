//! Output store
//!
//! A flat directory shared by every worker (writers) and the HTTP adapter
//! (readers). The only discipline writers follow is the publication protocol
//! in [`publish`]: write under a temporary name, then rename into place.
//! Names are unique per (dimensions, seed, timestamp, device, index), so
//! concurrent publication from different workers needs no locking.
//!
//! All operations are blocking filesystem calls; async callers run them on
//! the blocking pool.

mod listing;
mod naming;
mod publish;

use std::io;
use std::path::{Path, PathBuf};

use genpool_schemas::ArtifactMetadata;

pub use naming::{
    is_temporary, is_visible_image, ArtifactName, DecodedName, IMAGE_EXTENSION, METADATA_SUFFIX,
    STAMP_FORMAT, TEMP_PREFIX,
};

/// Output store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("metadata serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid artifact name: {0}")]
    InvalidName(String),

    #[error("artifact not found: {0}")]
    NotFound(String),
}

/// One image ready for publication
#[derive(Debug, Clone)]
pub struct PendingArtifact {
    pub name: ArtifactName,
    pub image: Vec<u8>,
    pub metadata: ArtifactMetadata,
}

/// Handle on the output directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory if it does not exist
    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}
