//! Registration, credential checks and session tokens.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::crypto;
use crate::error::{AuthError, AuthResult, StoreError};
use crate::models::User;
use crate::store::UserStore;
use crate::token::TokenSigner;

pub const USERNAME_MAX_LEN: usize = 32;
pub const PASSWORD_MAX_LEN: usize = 1024;

/// The authenticated caller, extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub username: String,
}

/// Verified against when the username is unknown, so both failure paths pay
/// the same argon2id cost.
const DECOY_PASSWORD: &str = "stash-server decoy credential";

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    signer: Arc<TokenSigner>,
    decoy_hash: Arc<String>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, jwt_secret: &[u8]) -> AuthResult<Self> {
        let decoy_hash = crypto::hash_password(DECOY_PASSWORD).map_err(AuthError::Hashing)?;
        Ok(Self {
            users,
            signer: Arc::new(TokenSigner::new(jwt_secret)),
            decoy_hash: Arc::new(decoy_hash),
        })
    }

    pub fn register(&self, username: &str, password: &str) -> AuthResult<User> {
        validate_username(username)?;
        validate_password(password)?;

        if self.users.get_by_username(username)?.is_some() {
            return Err(AuthError::DuplicateUser(username.to_string()));
        }

        let password_hash = crypto::hash_password(password).map_err(AuthError::Hashing)?;
        match self.users.create(username, &password_hash) {
            Ok(user) => {
                info!("Registered user {} with id {}", user.username, user.id);
                Ok(user)
            }
            Err(StoreError::UniqueViolation(_)) => {
                Err(AuthError::DuplicateUser(username.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Unknown usernames and wrong passwords fail identically, in value and
    /// in cost.
    pub fn authenticate(&self, username: &str, password: &str) -> AuthResult<User> {
        let user = self.users.get_by_username(username)?;
        let encoded = match &user {
            Some(user) => user.password_hash.as_str(),
            None => self.decoy_hash.as_str(),
        };
        let verified = crypto::verify_password(encoded, password);

        match user {
            Some(user) if verified => Ok(user),
            Some(user) => {
                warn!("Failed login for user {}", user.id);
                Err(AuthError::InvalidCredentials)
            }
            None => {
                warn!("Login attempt for unknown user {:?}", username);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    pub fn issue_token(&self, user: &User) -> AuthResult<String> {
        self.signer.issue(user.id, &user.username, Utc::now())
    }

    pub fn validate_token(&self, token: &str) -> AuthResult<Principal> {
        self.validate_token_at(token, Utc::now())
    }

    pub fn validate_token_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Principal> {
        let claims = self.signer.verify(token, now)?;
        Ok(Principal {
            user_id: claims.user_id,
            username: claims.username,
        })
    }
}

fn validate_username(username: &str) -> AuthResult<()> {
    if username.is_empty() {
        return Err(AuthError::InvalidInput("Username must not be empty".into()));
    }
    if username.len() > USERNAME_MAX_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Username must not exceed {} characters",
            USERNAME_MAX_LEN
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(AuthError::InvalidInput(
            "Username must not contain whitespace or control characters".into(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> AuthResult<()> {
    if password.is_empty() {
        return Err(AuthError::InvalidInput("Password must not be empty".into()));
    }
    if password.len() > PASSWORD_MAX_LEN {
        return Err(AuthError::InvalidInput(format!(
            "Password must not exceed {} characters",
            PASSWORD_MAX_LEN
        )));
    }
    Ok(())
}
