//! Postgres adapters over the diesel queries in `actions`.
//!
//! Every call checks a connection out of the r2d2 pool and runs synchronously;
//! handlers invoke the services through `web::block`, so this never runs on
//! the async executor.

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;

use crate::actions;
use crate::error::StoreResult;
use crate::models::{FileRecord, NewFileRecord, User};
use crate::store::{FileStore, UserStore};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;
type DbConnection = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

pub fn connect(database_url: &str, max_size: u32) -> StoreResult<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().max_size(max_size).build(manager)?;
    Ok(pool)
}

fn get_db_conn(pool: &DbPool) -> StoreResult<DbConnection> {
    Ok(pool.get()?)
}

#[derive(Clone)]
pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl UserStore for PgUserStore {
    fn create(&self, username: &str, password_hash: &str) -> StoreResult<User> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::insert_new_user(username, password_hash, &conn)?)
    }

    fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::get_user_from_username(username, &conn)?)
    }

    fn get_by_id(&self, user_id: i64) -> StoreResult<Option<User>> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::get_user_from_id(user_id, &conn)?)
    }

    fn increment_usage(&self, user_id: i64, bytes: i64, ceiling: Option<i64>) -> StoreResult<bool> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::increment_user_usage(user_id, bytes, ceiling, &conn)?)
    }

    fn decrement_usage(&self, user_id: i64, bytes: i64) -> StoreResult<()> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::decrement_user_usage(user_id, bytes, &conn)?)
    }
}

#[derive(Clone)]
pub struct PgFileStore {
    pool: DbPool,
}

impl PgFileStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl FileStore for PgFileStore {
    fn create(&self, new_file: NewFileRecord) -> StoreResult<FileRecord> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::insert_new_file_record(&new_file, &conn)?)
    }

    fn get_by_user_and_filename(
        &self,
        user_id: i64,
        filename: &str,
    ) -> StoreResult<Option<FileRecord>> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::get_file_record_by_owner_and_name(user_id, filename, &conn)?)
    }

    fn list_by_user(&self, user_id: i64) -> StoreResult<Vec<FileRecord>> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::get_file_records_for_owner(user_id, &conn)?)
    }

    fn delete(&self, file_id: i64) -> StoreResult<bool> {
        let conn = get_db_conn(&self.pool)?;
        Ok(actions::delete_file_record(file_id, &conn)?)
    }
}
