//! Persistence interfaces the core depends on.
//!
//! The services only ever see these traits. `postgres` backs them with diesel
//! for the running server; `memory` keeps everything in process for tests and
//! local experiments.

use crate::error::StoreResult;
use crate::models::{FileRecord, NewFileRecord, User};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryFileStore, MemoryUserStore};
pub use postgres::{DbPool, PgFileStore, PgUserStore};

/// Credential store: user records and their usage counters.
pub trait UserStore: Send + Sync {
    /// Persist a new user with zero usage.
    ///
    /// Must fail with `StoreError::UniqueViolation` when the username is taken.
    fn create(&self, username: &str, password_hash: &str) -> StoreResult<User>;

    fn get_by_username(&self, username: &str) -> StoreResult<Option<User>>;

    fn get_by_id(&self, user_id: i64) -> StoreResult<Option<User>>;

    /// Atomically add `bytes` to the user's usage.
    ///
    /// With a ceiling, the increment only happens if the new total stays
    /// within it. Returns `false` when nothing was applied.
    fn increment_usage(&self, user_id: i64, bytes: i64, ceiling: Option<i64>) -> StoreResult<bool>;

    /// Subtract `bytes` from the user's usage, clamping at zero.
    fn decrement_usage(&self, user_id: i64, bytes: i64) -> StoreResult<()>;
}

/// File metadata store. Owns the (user, filename) uniqueness constraint.
pub trait FileStore: Send + Sync {
    /// Must fail with `StoreError::UniqueViolation` when the owner already has
    /// a file with this name.
    fn create(&self, new_file: NewFileRecord) -> StoreResult<FileRecord>;

    fn get_by_user_and_filename(&self, user_id: i64, filename: &str)
        -> StoreResult<Option<FileRecord>>;

    fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<FileRecord>>;

    /// Returns whether a record was removed.
    fn delete(&self, file_id: i64) -> StoreResult<bool>;
}
