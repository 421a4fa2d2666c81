//! Quota-enforced, encrypted file storage.
//!
//! An upload runs strictly in this order: filename validation, the per-upload
//! ceiling, the (user, filename) conflict check, the usage reservation,
//! sealing, the blob write and finally the metadata insert. A failure after
//! the reservation undoes whatever was already done, so metadata never points
//! at a blob that was not written and usage never counts a file that does not
//! exist.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::blob::{self, BlobStore};
use crate::config::QuotaLimits;
use crate::crypto::{self, AtRestCipher};
use crate::error::{StorageError, StorageResult, StoreError};
use crate::models::{FileRecord, NewFileRecord};
use crate::store::{FileStore, UserStore};

pub const FILENAME_MAX_LEN: usize = 255;

#[derive(Clone)]
pub struct StorageEngine {
    users: Arc<dyn UserStore>,
    files: Arc<dyn FileStore>,
    blobs: Arc<dyn BlobStore>,
    cipher: Arc<AtRestCipher>,
    limits: QuotaLimits,
}

impl StorageEngine {
    pub fn new(
        users: Arc<dyn UserStore>,
        files: Arc<dyn FileStore>,
        blobs: Arc<dyn BlobStore>,
        encryption_key: &[u8],
        limits: QuotaLimits,
    ) -> StorageResult<Self> {
        let cipher = AtRestCipher::new(encryption_key).map_err(StorageError::Encryption)?;
        Ok(Self {
            users,
            files,
            blobs,
            cipher: Arc::new(cipher),
            limits,
        })
    }

    pub fn limits(&self) -> QuotaLimits {
        self.limits
    }

    pub fn upload(
        &self,
        user_id: i64,
        filename: &str,
        plaintext: &[u8],
    ) -> StorageResult<FileRecord> {
        validate_filename(filename)?;

        let requested = plaintext.len() as u64;
        if requested > self.limits.max_upload_bytes {
            return Err(StorageError::QuotaExceeded {
                requested,
                limit: self.limits.max_upload_bytes,
            });
        }

        if self
            .files
            .get_by_user_and_filename(user_id, filename)?
            .is_some()
        {
            return Err(StorageError::AlreadyExists(filename.to_string()));
        }

        let stored_size = crypto::sealed_len(plaintext.len()) as i64;
        self.reserve_usage(user_id, stored_size)?;

        let payload = self.cipher.seal(plaintext, &blob_context(user_id, filename));
        let blob_id = blob::new_blob_id();
        if let Err(e) = self.blobs.put(&blob_id, &payload) {
            self.release_usage(user_id, stored_size);
            return Err(e.into());
        }

        let new_file = NewFileRecord {
            user_id,
            filename: filename.to_string(),
            size: payload.len() as i64,
            blob_id: blob_id.clone(),
            date_created: Utc::now().naive_utc(),
        };
        match self.files.create(new_file) {
            Ok(record) => {
                info!(
                    "Stored {} for user {} ({} bytes sealed)",
                    record.filename, user_id, record.size
                );
                Ok(record)
            }
            Err(e) => {
                self.discard_blob(&blob_id);
                self.release_usage(user_id, stored_size);
                match e {
                    StoreError::UniqueViolation(_) => {
                        Err(StorageError::AlreadyExists(filename.to_string()))
                    }
                    e => Err(e.into()),
                }
            }
        }
    }

    pub fn download(&self, user_id: i64, filename: &str) -> StorageResult<Vec<u8>> {
        let record = self.find(user_id, filename)?;
        let payload = self.blobs.get(&record.blob_id)?;

        self.cipher
            .open(&payload, &blob_context(record.user_id, &record.filename))
            .map_err(|e| {
                error!(
                    "Sealed payload {} for file {} failed to open: {}",
                    record.blob_id, record.id, e
                );
                StorageError::Decryption(filename.to_string())
            })
    }

    pub fn delete(&self, user_id: i64, filename: &str) -> StorageResult<()> {
        let record = self.find(user_id, filename)?;
        if !self.files.delete(record.id)? {
            // Lost a race with another delete of the same file.
            return Err(StorageError::NotFound(filename.to_string()));
        }

        // The blob outlives the row until usage is released, so a failure
        // here can put the row back and the delete stays retryable.
        if let Err(e) = self.users.decrement_usage(user_id, record.size) {
            self.restore_record(&record);
            return Err(e.into());
        }

        self.discard_blob(&record.blob_id);
        info!("Deleted {} for user {}", record.filename, user_id);
        Ok(())
    }

    pub fn list(&self, user_id: i64) -> StorageResult<Vec<FileRecord>> {
        Ok(self.files.list_by_user(user_id)?)
    }

    /// Bytes currently charged to the user.
    pub fn usage(&self, user_id: i64) -> StorageResult<i64> {
        match self.users.get_by_id(user_id)? {
            Some(user) => Ok(user.usage),
            None => Err(StorageError::UnknownOwner(user_id)),
        }
    }

    fn find(&self, user_id: i64, filename: &str) -> StorageResult<FileRecord> {
        match self.files.get_by_user_and_filename(user_id, filename)? {
            Some(record) if record.user_id == user_id => Ok(record),
            _ => Err(StorageError::NotFound(filename.to_string())),
        }
    }

    fn reserve_usage(&self, user_id: i64, bytes: i64) -> StorageResult<()> {
        let ceiling = self.limits.max_total_bytes.map(|limit| limit as i64);
        if self.users.increment_usage(user_id, bytes, ceiling)? {
            return Ok(());
        }

        let user = self
            .users
            .get_by_id(user_id)?
            .ok_or(StorageError::UnknownOwner(user_id))?;
        debug!(
            "User {} at {} bytes cannot store {} more",
            user_id, user.usage, bytes
        );
        Err(StorageError::QuotaExceeded {
            requested: (user.usage + bytes) as u64,
            limit: ceiling.unwrap_or(i64::MAX) as u64,
        })
    }

    fn release_usage(&self, user_id: i64, bytes: i64) {
        if let Err(e) = self.users.decrement_usage(user_id, bytes) {
            error!(
                "Could not release {} bytes of usage for user {}: {}",
                bytes, user_id, e
            );
        }
    }

    fn restore_record(&self, record: &FileRecord) {
        let restored = NewFileRecord {
            user_id: record.user_id,
            filename: record.filename.clone(),
            size: record.size,
            blob_id: record.blob_id.clone(),
            date_created: record.date_created,
        };
        if let Err(e) = self.files.create(restored) {
            error!(
                "Could not restore {} for user {} after a failed delete: {}",
                record.filename, record.user_id, e
            );
        }
    }

    fn discard_blob(&self, blob_id: &str) {
        if let Err(e) = self.blobs.delete(blob_id) {
            warn!("Could not delete blob {}: {}", blob_id, e);
        }
    }
}

/// Associated data for a stored payload: the owner and the name it was
/// uploaded under. A blob moved to another record will not open.
fn blob_context(user_id: i64, filename: &str) -> Vec<u8> {
    format!("{}:{}", user_id, filename).into_bytes()
}

fn validate_filename(filename: &str) -> StorageResult<()> {
    let reason = if filename.is_empty() {
        "Filename must not be empty".to_string()
    } else if filename.len() > FILENAME_MAX_LEN {
        format!("Filename must not exceed {} characters", FILENAME_MAX_LEN)
    } else if filename == "." || filename == ".." {
        "Filename must not be a relative path".to_string()
    } else if filename
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        "Filename must not contain path separators or control characters".to_string()
    } else {
        return Ok(());
    };
    Err(StorageError::InvalidFilename(reason))
}
