//! In-memory store adapters.
//!
//! Thread-safe via `Mutex`; each operation holds the lock for its whole
//! read-modify-write so the atomicity guarantees match the postgres adapter.
//! A poisoned lock surfaces as `StoreError::Unavailable`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::error::{StoreError, StoreResult};
use crate::models::{FileRecord, NewFileRecord, User};
use crate::store::{FileStore, UserStore};

fn lock<T>(table: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    table
        .lock()
        .map_err(|_| StoreError::Unavailable("in-memory table lock poisoned".into()))
}

#[derive(Default)]
struct UserTable {
    next_id: i64,
    rows: HashMap<i64, User>,
}

#[derive(Default)]
pub struct MemoryUserStore {
    table: Mutex<UserTable>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered users
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UserStore for MemoryUserStore {
    fn create(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let mut table = lock(&self.table)?;
        if table.rows.values().any(|u| u.username == username) {
            return Err(StoreError::UniqueViolation(format!(
                "username {} already exists",
                username
            )));
        }

        table.next_id += 1;
        let user = User {
            id: table.next_id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            usage: 0,
            date_registered: Utc::now().naive_utc(),
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }

    fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let table = lock(&self.table)?;
        Ok(table.rows.values().find(|u| u.username == username).cloned())
    }

    fn get_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        Ok(lock(&self.table)?.rows.get(&user_id).cloned())
    }

    fn increment_usage(&self, user_id: i64, bytes: i64, ceiling: Option<i64>) -> StoreResult<bool> {
        let mut table = lock(&self.table)?;
        let user = match table.rows.get_mut(&user_id) {
            Some(user) => user,
            None => return Ok(false),
        };

        let total = user.usage.saturating_add(bytes);
        if let Some(limit) = ceiling {
            if total > limit {
                return Ok(false);
            }
        }
        user.usage = total;
        Ok(true)
    }

    fn decrement_usage(&self, user_id: i64, bytes: i64) -> StoreResult<()> {
        let mut table = lock(&self.table)?;
        if let Some(user) = table.rows.get_mut(&user_id) {
            user.usage = (user.usage - bytes).max(0);
        }
        Ok(())
    }
}

#[derive(Default)]
struct FileTable {
    next_id: i64,
    rows: HashMap<i64, FileRecord>,
}

#[derive(Default)]
pub struct MemoryFileStore {
    table: Mutex<FileTable>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of file records across all users
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .rows
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FileStore for MemoryFileStore {
    fn create(&self, new_file: NewFileRecord) -> StoreResult<FileRecord> {
        let mut table = lock(&self.table)?;
        let taken = table
            .rows
            .values()
            .any(|f| f.user_id == new_file.user_id && f.filename == new_file.filename);
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "file {} already exists for user {}",
                new_file.filename, new_file.user_id
            )));
        }

        table.next_id += 1;
        let record = FileRecord {
            id: table.next_id,
            user_id: new_file.user_id,
            filename: new_file.filename,
            size: new_file.size,
            blob_id: new_file.blob_id,
            date_created: new_file.date_created,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    fn get_by_user_and_filename(
        &self,
        user_id: i64,
        filename: &str,
    ) -> StoreResult<Option<FileRecord>> {
        let table = lock(&self.table)?;
        Ok(table
            .rows
            .values()
            .find(|f| f.user_id == user_id && f.filename == filename)
            .cloned())
    }

    fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<FileRecord>> {
        let table = lock(&self.table)?;
        let mut records: Vec<FileRecord> = table
            .rows
            .values()
            .filter(|f| f.user_id == user_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(records)
    }

    fn delete(&self, file_id: i64) -> StoreResult<bool> {
        Ok(lock(&self.table)?.rows.remove(&file_id).is_some())
    }
}
