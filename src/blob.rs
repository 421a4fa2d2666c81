//! Storage for encrypted payloads.
//!
//! Blobs are opaque bytes addressed by the UUID recorded in the file's
//! metadata. Nothing here knows about users, filenames or keys.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::error::{BlobError, BlobResult};

pub fn new_blob_id() -> String {
    Uuid::new_v4().to_string()
}

pub trait BlobStore: Send + Sync {
    /// Store `data` under `blob_id`. A reader never observes a partial write.
    fn put(&self, blob_id: &str, data: &[u8]) -> BlobResult<()>;

    /// Returns `BlobError::NotFound` if nothing is stored under `blob_id`.
    fn get(&self, blob_id: &str) -> BlobResult<Vec<u8>>;

    /// Idempotent.
    fn delete(&self, blob_id: &str) -> BlobResult<()>;
}

/// Blobs as files under a root directory: `{root}/{blob_id}`.
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    /// Creates the directory if it doesn't exist.
    pub fn new(root: impl AsRef<Path>) -> BlobResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, blob_id: &str) -> BlobResult<PathBuf> {
        if Uuid::parse_str(blob_id).is_err() {
            return Err(BlobError::InvalidId(blob_id.to_string()));
        }
        Ok(self.root.join(blob_id))
    }
}

impl BlobStore for DiskBlobStore {
    fn put(&self, blob_id: &str, data: &[u8]) -> BlobResult<()> {
        let path = self.blob_path(blob_id)?;
        let temp_path = path.with_extension("part");

        let result = File::create(&temp_path).and_then(|mut file| {
            file.write_all(data)?;
            file.sync_all()
        });
        if let Err(e) = result.and_then(|_| fs::rename(&temp_path, &path)) {
            fs::remove_file(&temp_path).ok();
            return Err(e.into());
        }
        Ok(())
    }

    fn get(&self, blob_id: &str) -> BlobResult<Vec<u8>> {
        let path = self.blob_path(blob_id)?;
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(BlobError::NotFound(blob_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, blob_id: &str) -> BlobResult<()> {
        let path = self.blob_path(blob_id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

type BlobMap = HashMap<String, Vec<u8>>;

/// Blobs held in process. A poisoned lock surfaces as
/// `BlobError::Unavailable`.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BlobMap>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `f` to a stored blob in place. Used to simulate corruption.
    pub fn tamper<F: FnOnce(&mut Vec<u8>)>(&self, blob_id: &str, f: F) -> bool {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        match blobs.get_mut(blob_id) {
            Some(data) => {
                f(data);
                true
            }
            None => false,
        }
    }

    fn read(&self) -> BlobResult<RwLockReadGuard<'_, BlobMap>> {
        self.blobs.read().map_err(|_| poisoned())
    }

    fn write(&self) -> BlobResult<RwLockWriteGuard<'_, BlobMap>> {
        self.blobs.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> BlobError {
    BlobError::Unavailable("in-memory blob lock poisoned".into())
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, blob_id: &str, data: &[u8]) -> BlobResult<()> {
        self.write()?.insert(blob_id.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, blob_id: &str) -> BlobResult<Vec<u8>> {
        self.read()?
            .get(blob_id)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(blob_id.to_string()))
    }

    fn delete(&self, blob_id: &str) -> BlobResult<()> {
        self.write()?.remove(blob_id);
        Ok(())
    }
}
