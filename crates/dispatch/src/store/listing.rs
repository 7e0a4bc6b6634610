//! Read side of the output store

use std::fs;
use std::io;
use std::time::SystemTime;

use genpool_schemas::{ArtifactMetadata, MetadataRecord, ReconstructedMetadata};
use tracing::{debug, info, warn};

use super::naming::{is_temporary, is_visible_image};
use super::{ArtifactName, ArtifactStore, StoreError};

impl ArtifactStore {
    /// Visible images, newest first, at most `limit`.
    ///
    /// A missing directory lists as empty.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut images: Vec<(SystemTime, String)> = Vec::new();

        for entry in self.entries()? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_visible_image(&name) {
                continue;
            }
            // The file may have been replaced or removed since read_dir.
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(_) => continue,
            };
            images.push((modified, name));
        }

        images.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        images.truncate(limit);
        Ok(images.into_iter().map(|(_, name)| name).collect())
    }

    /// Number of visible images
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|entry| is_visible_image(&entry.file_name().to_string_lossy()))
            .count())
    }

    /// Metadata for an image, reconstructed from its name when the record is
    /// missing or unreadable.
    pub fn metadata(&self, name: &ArtifactName) -> Result<MetadataRecord, StoreError> {
        let metadata_path = self.path_of(&name.metadata_name());

        match fs::read(&metadata_path) {
            Ok(bytes) => match serde_json::from_slice::<ArtifactMetadata>(&bytes) {
                Ok(metadata) => return Ok(MetadataRecord::Recorded(metadata)),
                Err(e) => {
                    warn!(name = %name, error = %e, "Corrupt metadata record, reconstructing from name")
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if !self.path_of(name.as_str()).is_file() {
                    return Err(StoreError::NotFound(name.to_string()));
                }
                debug!(name = %name, "Metadata record missing, reconstructing from name");
            }
            Err(e) => return Err(e.into()),
        }

        let decoded = name.decode();
        Ok(MetadataRecord::Reconstructed(ReconstructedMetadata::new(
            decoded.width,
            decoded.height,
            decoded.seed,
        )))
    }

    /// Bytes of a visible image
    pub fn read_image(&self, name: &ArtifactName) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.path_of(name.as_str())) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove temporary files left behind by an interrupted run.
    ///
    /// Must only run while no worker is publishing.
    pub fn sweep_temporaries(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for entry in self.entries()? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_temporary(&name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(name = %name, error = %e, "Failed to remove stale temporary file"),
            }
        }
        if removed > 0 {
            info!(removed, "Removed stale temporary files");
        }
        Ok(removed)
    }

    fn entries(&self) -> Result<Vec<fs::DirEntry>, StoreError> {
        let read_dir = match fs::read_dir(self.root()) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(read_dir.filter_map(Result::ok).collect())
    }
}
