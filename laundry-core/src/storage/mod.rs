//! Object storage seam and local staging of fetched clips.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use tempfile::TempPath;
use tracing::{debug, warn};

use crate::error::{AlertError, Result};

/// Read-only access to uploaded clips.
pub trait ObjectStore: Send + Sync {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        (**self).fetch(bucket, key)
    }
}

/// Filesystem-backed store: `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object path, refusing anything that would leave the root.
    pub fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let bucket = checked_relative(bucket)?;
        let key = checked_relative(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

fn checked_relative(raw: &str) -> Result<&Path> {
    let path = Path::new(raw);
    if raw.trim().is_empty() {
        return Err(AlertError::InvalidKey("empty path".into()));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(AlertError::InvalidKey(raw.to_string())),
        }
    }
    Ok(path)
}

impl ObjectStore for LocalObjectStore {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(bucket, key)?;
        match std::fs::read(&path) {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes = bytes.len(), "object fetched");
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AlertError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// A fetched clip written to a private temp file for the duration of its
/// processing. The file is removed on [`StagedClip::cleanup`] or on drop;
/// removal failures are logged only.
#[derive(Debug)]
pub struct StagedClip {
    path: Option<TempPath>,
}

impl StagedClip {
    pub fn write(staging_dir: &Path, bytes: &[u8]) -> Result<Self> {
        std::fs::create_dir_all(staging_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("clip-")
            .suffix(".wav")
            .tempfile_in(staging_dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        let path = file.into_temp_path();
        debug!(path = %path.display(), bytes = bytes.len(), "clip staged");
        Ok(Self { path: Some(path) })
    }

    /// Path of the staged file, or `None` once cleaned up.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn cleanup(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!(path = %shown, "staged clip removed"),
                Err(e) => warn!(path = %shown, error = %e, "could not remove staged clip"),
            }
        }
    }
}

impl Drop for StagedClip {
    fn drop(&mut self) {
        self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetches_bucket_relative_objects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads/2024")).unwrap();
        std::fs::write(dir.path().join("uploads/2024/a.wav"), b"bytes").unwrap();

        let store = LocalObjectStore::new(dir.path());
        assert_eq!(store.fetch("uploads", "2024/a.wav").unwrap(), b"bytes");
    }

    #[test]
    fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path());
        let err = store.fetch("uploads", "nope.wav").unwrap_err();
        assert!(matches!(err, AlertError::ObjectNotFound { .. }));
    }

    #[test]
    fn escaping_keys_are_rejected() {
        let store = LocalObjectStore::new("/srv/clips");
        for key in ["../secret.wav", "a/../../b.wav", "/etc/passwd", ""] {
            assert!(
                matches!(store.resolve("uploads", key), Err(AlertError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
        assert!(store.resolve("..", "a.wav").is_err());
    }

    #[test]
    fn staged_clip_is_removed_on_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedClip::write(dir.path(), b"RIFF").unwrap();
        let path = staged.path().unwrap().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"RIFF");

        staged.cleanup();
        assert!(!path.exists());
        assert!(staged.path().is_none());
        staged.cleanup();
    }

    #[test]
    fn staged_clip_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let staged = StagedClip::write(&dir.path().join("staging"), b"x").unwrap();
            staged.path().unwrap().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn cleanup_tolerates_already_deleted_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedClip::write(dir.path(), b"x").unwrap();
        std::fs::remove_file(staged.path().unwrap()).unwrap();
        staged.cleanup();
    }
}
