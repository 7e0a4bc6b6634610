//! Publication protocol
//!
//! For every artifact, in this order:
//! 1. write the image to `tmp_<name>`
//! 2. write the metadata to `tmp_<name>.json`
//! 3. rename `tmp_<name>` to `<name>`
//! 4. rename `tmp_<name>.json` to `<name>.json`
//!
//! A reader therefore sees either no file at `<name>` or the complete image.
//! Because the image becomes visible first, a reader may briefly find an image
//! without metadata and falls back to decoding the name.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};

use super::{ArtifactStore, PendingArtifact, StoreError};

impl ArtifactStore {
    /// Publish a single artifact
    pub fn publish(&self, artifact: &PendingArtifact) -> Result<(), StoreError> {
        let temp_image = self.path_of(&artifact.name.temp_image_name());
        let temp_metadata = self.path_of(&artifact.name.temp_metadata_name());

        let result = self.write_and_rename(artifact, &temp_image, &temp_metadata);
        if result.is_err() {
            // Whatever was not renamed stays invisible; remove it so it does
            // not accumulate.
            remove_if_present(&temp_image);
            remove_if_present(&temp_metadata);
        }
        result
    }

    /// Publish a batch in order, stopping at the first failure.
    ///
    /// Returns the number of artifacts published.
    pub fn publish_batch(&self, batch: &[PendingArtifact]) -> Result<usize, StoreError> {
        self.publish_batch_while(batch, || true)
    }

    /// Like [`publish_batch`](Self::publish_batch), but consults `proceed`
    /// before each artifact and stops once it returns false. An artifact is
    /// never interrupted halfway, so the batch ends as a complete prefix.
    pub fn publish_batch_while(
        &self,
        batch: &[PendingArtifact],
        mut proceed: impl FnMut() -> bool,
    ) -> Result<usize, StoreError> {
        let mut published = 0;
        for artifact in batch {
            if !proceed() {
                debug!(
                    published,
                    remaining = batch.len() - published,
                    "Publication halted"
                );
                break;
            }
            self.publish(artifact)?;
            published += 1;
        }
        if published > 0 {
            sync_dir(self.root());
        }
        Ok(published)
    }

    fn write_and_rename(
        &self,
        artifact: &PendingArtifact,
        temp_image: &Path,
        temp_metadata: &Path,
    ) -> Result<(), StoreError> {
        write_synced(temp_image, &artifact.image)?;
        let metadata = serde_json::to_vec(&artifact.metadata)?;
        write_synced(temp_metadata, &metadata)?;

        fs::rename(temp_image, self.path_of(artifact.name.as_str()))?;
        fs::rename(temp_metadata, self.path_of(&artifact.name.metadata_name()))?;

        debug!(name = %artifact.name, bytes = artifact.image.len(), "Artifact published");
        Ok(())
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove temporary file");
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Err(e) = File::open(dir).and_then(|d| d.sync_all()) {
        debug!(dir = %dir.display(), error = %e, "Directory sync skipped");
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceId;
    use crate::store::ArtifactName;
    use chrono::Utc;
    use genpool_schemas::ArtifactMetadata;

    fn artifact(index: usize, bytes: &[u8]) -> PendingArtifact {
        let now = Utc::now();
        PendingArtifact {
            name: ArtifactName::for_output(512, 512, 42, now, DeviceId(0), index),
            image: bytes.to_vec(),
            metadata: ArtifactMetadata {
                prompt: "a cat".into(),
                width: 512,
                height: 512,
                seed: 42,
                steps: 4,
                guidance: 0.0,
                timestamp: now,
                device: 0,
                index: index as u32,
            },
        }
    }

    #[test]
    fn test_publish_leaves_only_final_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let item = artifact(0, b"png-bytes");

        store.publish(&item).unwrap();

        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();

        assert_eq!(
            names,
            vec![item.name.to_string(), item.name.metadata_name()]
        );
        assert_eq!(fs::read(dir.path().join(item.name.as_str())).unwrap(), b"png-bytes");

        let meta: ArtifactMetadata =
            serde_json::from_slice(&fs::read(dir.path().join(item.name.metadata_name())).unwrap())
                .unwrap();
        assert_eq!(meta, item.metadata);
    }

    #[test]
    fn test_failed_publish_cleans_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let item = artifact(0, b"png-bytes");

        // A directory squatting on the final metadata name makes step 4 fail.
        fs::create_dir(dir.path().join(item.name.metadata_name())).unwrap();
        fs::write(dir.path().join(item.name.metadata_name()).join("x"), b"x").unwrap();

        assert!(store.publish(&item).is_err());
        assert!(!dir.path().join(item.name.temp_image_name()).exists());
        assert!(!dir.path().join(item.name.temp_metadata_name()).exists());
    }

    #[test]
    fn test_publish_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("missing"));

        let err = store.publish_batch(&[artifact(0, b"x")]).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn test_batch_publishes_every_index() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let batch: Vec<_> = (0..4).map(|i| artifact(i, &[i as u8; 16])).collect();

        assert_eq!(store.publish_batch(&batch).unwrap(), 4);
        for item in &batch {
            assert!(dir.path().join(item.name.as_str()).is_file());
            assert!(dir.path().join(item.name.metadata_name()).is_file());
        }
    }

    #[test]
    fn test_halted_batch_publishes_complete_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let batch: Vec<_> = (0..4).map(|i| artifact(i, &[i as u8; 16])).collect();

        let mut budget = 2;
        let published = store
            .publish_batch_while(&batch, || {
                budget -= 1;
                budget >= 0
            })
            .unwrap();

        assert_eq!(published, 2);
        for item in &batch[..2] {
            assert!(dir.path().join(item.name.as_str()).is_file());
            assert!(dir.path().join(item.name.metadata_name()).is_file());
        }
        for item in &batch[2..] {
            assert!(!dir.path().join(item.name.as_str()).exists());
            assert!(!dir.path().join(item.name.temp_image_name()).exists());
        }
    }
}
