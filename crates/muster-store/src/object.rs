//! Blob storage seam and a filesystem-backed reference implementation.
//!
//! Reference images live at one deterministic key per user; registration
//! overwrites in place, so there is never more than one blob per identifier.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("object store i/o for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Deterministic object key for a user's reference image.
pub fn reference_image_key(identifier: &str) -> String {
    format!("reference_images/face_{identifier}.jpg")
}

/// Blob storage operations the session manager relies on.
///
/// Upload and download go through local files rather than in-memory buffers:
/// the match engine reads files, and the hosted stores this fronts move
/// blobs the same way.
pub trait ObjectStore: Send + Sync {
    /// Store the file at `local` under `key`, overwriting any existing blob.
    fn put_file(&self, key: &str, local: &Path) -> Result<(), ObjectStoreError>;

    /// Copy the blob at `key` into `dest`. `NotFound` if absent.
    fn fetch_to_file(&self, key: &str, dest: &Path) -> Result<(), ObjectStoreError>;

    fn exists(&self, key: &str) -> Result<bool, ObjectStoreError>;

    /// Remove the blob at `key`. `NotFound` if absent.
    fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Public retrieval URL for `key`, whether or not the blob exists yet.
    fn public_url(&self, key: &str) -> String;
}

/// Object store rooted in a local directory.
pub struct FsObjectStore {
    root: PathBuf,
    public_base: String,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Result<Self, ObjectStoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| ObjectStoreError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            public_base: public_base.into(),
        })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for FsObjectStore {
    fn put_file(&self, key: &str, local: &Path) -> Result<(), ObjectStoreError> {
        let dest = self.blob_path(key);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|source| ObjectStoreError::Io {
                key: key.to_string(),
                source,
            })?;
        }
        fs::copy(local, &dest).map_err(|source| ObjectStoreError::Io {
            key: key.to_string(),
            source,
        })?;
        tracing::debug!(key, dest = %dest.display(), "blob stored");
        Ok(())
    }

    fn fetch_to_file(&self, key: &str, dest: &Path) -> Result<(), ObjectStoreError> {
        let src = self.blob_path(key);
        if !src.exists() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        fs::copy(&src, dest).map_err(|source| ObjectStoreError::Io {
            key: key.to_string(),
            source,
        })?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        Ok(self.blob_path(key).exists())
    }

    fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let path = self.blob_path(key);
        if !path.exists() {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        fs::remove_file(&path).map_err(|source| ObjectStoreError::Io {
            key: key.to_string(),
            source,
        })?;
        tracing::debug!(key, "blob deleted");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.public_base.trim_end_matches('/'))
    }
}
