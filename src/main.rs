use std::io;
use std::sync::Arc;

use actix_web::{middleware, App, HttpServer};
use log::{error, info};

use stash_server::auth::AuthService;
use stash_server::blob::DiskBlobStore;
use stash_server::config::Config;
use stash_server::handlers::{self, AppState};
use stash_server::storage::StorageEngine;
use stash_server::store::{self, PgFileStore, PgUserStore};

const DEFAULT_LOG_FILTER: &str = "actix_web=info,stash_server=info";

fn startup_error(context: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, e);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

fn build_state(config: &Config) -> io::Result<AppState> {
    let pool = store::postgres::connect(&config.database_url, config.database_pool_size)
        .map_err(|e| startup_error("Failed to create database pool", e))?;
    let users = Arc::new(PgUserStore::new(pool.clone()));
    let files = Arc::new(PgFileStore::new(pool));
    let blobs = DiskBlobStore::new(&config.storage_dir)
        .map_err(|e| startup_error("Failed to open storage directory", e))?;

    let storage = StorageEngine::new(
        users.clone(),
        files,
        Arc::new(blobs),
        &config.encryption_key,
        config.limits,
    )
    .map_err(|e| startup_error("Failed to initialise storage", e))?;

    let auth = AuthService::new(users, &config.jwt_secret)
        .map_err(|e| startup_error("Failed to initialise authentication", e))?;

    Ok(AppState { auth, storage })
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", DEFAULT_LOG_FILTER);
    }
    env_logger::init();

    stash_server::crypto::init().map_err(|e| startup_error("Crypto setup failed", e))?;
    let config = Config::from_env().map_err(|e| startup_error("Invalid configuration", e))?;
    info!("Starting with {:?}", config);

    let state = build_state(&config)?;

    HttpServer::new(move || {
        App::new()
            .data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&config.server_address)?
    .run()
    .await
}
