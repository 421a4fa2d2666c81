use chrono::NaiveDateTime;
use serde::Serialize;

use crate::schema::{files, users};

#[derive(Debug, Clone, Queryable)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub usage: i64,
    pub date_registered: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[table_name = "users"]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub usage: i64,
    pub date_registered: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub size: i64,
    #[serde(skip)]
    pub blob_id: String,
    pub date_created: NaiveDateTime,
}

#[derive(Debug, Clone, Insertable)]
#[table_name = "files"]
pub struct NewFileRecord {
    pub user_id: i64,
    pub filename: String,
    pub size: i64,
    pub blob_id: String,
    pub date_created: NaiveDateTime,
}
