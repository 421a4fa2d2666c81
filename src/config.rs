//! Process configuration, read once from the environment at startup.
//!
//! `.env` files are honoured through `dotenv` in `main`; everything here only
//! sees plain variable lookups so it can be exercised without touching the
//! real process environment.

use std::path::PathBuf;

use sodiumoxide::base64;

use crate::crypto::KEY_LEN;
use crate::error::ConfigError;

const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8000";
const DEFAULT_STORAGE_DIR: &str = "./storage";
const DEFAULT_POOL_SIZE: u32 = 10;
const MIN_JWT_SECRET_LEN: usize = 16;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub database_pool_size: u32,
    pub server_address: String,
    pub jwt_secret: Vec<u8>,
    pub encryption_key: [u8; KEY_LEN],
    pub storage_dir: PathBuf,
    pub limits: QuotaLimits,
}

/// Byte ceilings enforced by the storage engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    /// Largest plaintext accepted by a single upload.
    pub max_upload_bytes: u64,
    /// Ceiling on the sum of stored (encrypted) sizes per user. `None` tracks
    /// usage without enforcing a total.
    pub max_total_bytes: Option<u64>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_pool_size", &self.database_pool_size)
            .field("server_address", &self.server_address)
            .field("storage_dir", &self.storage_dir)
            .field("limits", &self.limits)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let database_url = required("DATABASE_URL")?;
        let jwt_secret = required("JWT_SECRET")?.into_bytes();
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET",
                reason: format!("must be at least {} bytes", MIN_JWT_SECRET_LEN),
            });
        }

        let encryption_key = parse_key(&required("ENCRYPTION_KEY")?)?;

        let max_upload_bytes =
            parse_positive("MAX_STORAGE_PER_USER", &required("MAX_STORAGE_PER_USER")?)?;
        let max_total_bytes = match lookup("STORAGE_QUOTA_PER_USER") {
            Some(v) => Some(parse_positive("STORAGE_QUOTA_PER_USER", &v)?),
            None => None,
        };

        let database_pool_size = match lookup("DATABASE_POOL_SIZE") {
            Some(v) => parse_positive("DATABASE_POOL_SIZE", &v)? as u32,
            None => DEFAULT_POOL_SIZE,
        };

        Ok(Config {
            database_url,
            database_pool_size,
            server_address: lookup("SERVER_ADDRESS")
                .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string()),
            jwt_secret,
            encryption_key,
            storage_dir: PathBuf::from(
                lookup("STORAGE_DIR").unwrap_or_else(|| DEFAULT_STORAGE_DIR.to_string()),
            ),
            limits: QuotaLimits {
                max_upload_bytes,
                max_total_bytes,
            },
        })
    }
}

fn parse_key(value: &str) -> Result<[u8; KEY_LEN], ConfigError> {
    let bytes = base64::decode(value.trim(), base64::Variant::Original).map_err(|_| {
        ConfigError::Invalid {
            var: "ENCRYPTION_KEY",
            reason: "not valid base64".to_string(),
        }
    })?;

    if bytes.len() != KEY_LEN {
        return Err(ConfigError::Invalid {
            var: "ENCRYPTION_KEY",
            reason: format!("must decode to {} bytes, got {}", KEY_LEN, bytes.len()),
        });
    }

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    Ok(key)
}

fn parse_positive(var: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            reason: "must be greater than 0".to_string(),
        }),
        Ok(n) if n > i64::MAX as u64 => Err(ConfigError::Invalid {
            var,
            reason: "too large".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}
