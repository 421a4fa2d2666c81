#[macro_use]
extern crate diesel;

pub mod actions;
pub mod auth;
pub mod blob;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod models;
pub mod schema;
pub mod storage;
pub mod store;
pub mod token;
