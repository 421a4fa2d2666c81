//! Error types for every layer of the service, and their HTTP mapping.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use diesel::result::DatabaseErrorKind;
use serde_json::json;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;
pub type BlobResult<T> = Result<T, BlobError>;
pub type AuthResult<T> = Result<T, AuthError>;
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Could not initialise libsodium")]
    Init,

    #[error("Encryption key must be {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("Authentication tag did not verify")]
    Decryption,

    #[error("Password hashing failed")]
    Hashing,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Database error: {0}")]
    Database(diesel::result::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<diesel::result::Error> for StoreError {
    fn from(e: diesel::result::Error) -> Self {
        match e {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::UniqueViolation(info.message().to_string())
            }
            e => StoreError::Database(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid blob id: {0}")]
    InvalidId(String),

    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blob store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Username already registered: {0}")]
    DuplicateUser(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Credential hashing failed: {0}")]
    Hashing(CryptoError),

    #[error("Token encoding failed: {0}")]
    TokenEncoding(String),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error("Quota exceeded: {requested} bytes requested, limit is {limit} bytes")]
    QuotaExceeded { requested: u64, limit: u64 },

    #[error("No such user: {0}")]
    UnknownOwner(i64),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Encryption failed: {0}")]
    Encryption(CryptoError),

    #[error("Decryption failed for {0}")]
    Decryption(String),

    #[error("Metadata store error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),
}

/// Error surfaced by the HTTP handlers.
///
/// Client-visible messages are fixed strings; `Internal` carries the detail
/// that is only written to the server log.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{public}: {detail}")]
    Internal { public: &'static str, detail: String },
}

impl ApiError {
    pub fn internal(public: &'static str, detail: impl ToString) -> Self {
        ApiError::Internal {
            public,
            detail: detail.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidInput(reason) => ApiError::BadRequest(reason),
            AuthError::InvalidCredentials => ApiError::Unauthorized("Invalid credentials"),
            AuthError::InvalidToken => ApiError::Unauthorized("Invalid token"),
            e @ AuthError::DuplicateUser(_) => ApiError::internal("Error registering user", e),
            e @ AuthError::Hashing(_) => ApiError::internal("Error processing credentials", e),
            e @ AuthError::TokenEncoding(_) => ApiError::internal("Error creating token", e),
            e @ AuthError::Store(_) => ApiError::internal("Internal server error", e),
        }
    }
}

impl ApiError {
    /// Upload and download failures share one generic 500 per operation.
    /// Only malformed input and authentication problems keep their own status.
    pub fn from_transfer(public: &'static str, e: StorageError) -> Self {
        match e {
            StorageError::InvalidFilename(reason) => ApiError::BadRequest(reason),
            StorageError::UnknownOwner(_) => ApiError::Unauthorized("Invalid token"),
            e => ApiError::internal(public, e),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => ApiError::NotFound("File not found"),
            e => ApiError::from_transfer("Error processing file", e),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Internal { public, detail } => {
                log::error!("{}: {}", public, detail);
                public.to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_and_token_errors_are_unauthorized() {
        let e: ApiError = AuthError::InvalidCredentials.into();
        assert_eq!(e.status_code(), StatusCode::UNAUTHORIZED);
        let e: ApiError = AuthError::InvalidToken.into();
        assert_eq!(e.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_duplicate_user_is_generic_internal_error() {
        let e: ApiError = AuthError::DuplicateUser("alice".into()).into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(e, ApiError::Internal { public: "Error registering user", .. }));
    }

    #[test]
    fn test_decryption_failure_hides_detail() {
        let e: ApiError = StorageError::Decryption("notes.txt".into()).into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.to_string(), "Error processing file: Decryption failed for notes.txt");
        match e {
            ApiError::Internal { public, .. } => assert_eq!(public, "Error processing file"),
            _ => panic!("expected internal error"),
        }
    }

    #[test]
    fn test_transfer_failures_are_generic_internal_errors() {
        let failures = vec![
            StorageError::QuotaExceeded {
                requested: 11,
                limit: 10,
            },
            StorageError::AlreadyExists("notes.txt".into()),
            StorageError::NotFound("notes.txt".into()),
        ];
        for failure in failures {
            let e = ApiError::from_transfer("Error uploading file", failure);
            assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(matches!(e, ApiError::Internal { public: "Error uploading file", .. }));
        }
    }

    #[test]
    fn test_transfer_input_and_auth_errors_keep_status() {
        let invalid = StorageError::InvalidFilename("..".into());
        let e = ApiError::from_transfer("Error uploading file", invalid);
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);
        let e = ApiError::from_transfer("Error downloading file", StorageError::UnknownOwner(4));
        assert_eq!(e.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_delete_of_missing_file_is_not_found() {
        let e: ApiError = StorageError::NotFound("notes.txt".into()).into();
        assert_eq!(e.status_code(), StatusCode::NOT_FOUND);
    }
}
