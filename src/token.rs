//! Stateless session tokens in JWT compact form, signed with HMAC-SHA256.
//!
//! Only `HS256` is accepted on the way in; a token whose header names any
//! other algorithm (including `none`) is rejected before its MAC is checked.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sodiumoxide::base64;
use sodiumoxide::utils;
use sodiumoxide::crypto::auth::hmacsha256;

use crate::error::{AuthError, AuthResult};

pub const TOKEN_LIFETIME_HOURS: i64 = 24;

const ALGORITHM: &str = "HS256";
const TOKEN_TYPE: &str = "JWT";

#[derive(Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default)]
    typ: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenSigner {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl TokenSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: secret.to_vec(),
            lifetime: Duration::hours(TOKEN_LIFETIME_HOURS),
        }
    }

    pub fn issue(&self, user_id: i64, username: &str, now: DateTime<Utc>) -> AuthResult<String> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: Some(TOKEN_TYPE.to_string()),
        };
        let claims = Claims {
            user_id,
            username: username.to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        let mut token = encode_segment(&header)?;
        token.push('.');
        token.push_str(&encode_segment(&claims)?);

        let tag = self.mac(token.as_bytes());
        token.push('.');
        token.push_str(&base64::encode(tag.as_ref(), base64::Variant::UrlSafeNoPadding));
        Ok(token)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Claims> {
        let mut segments = token.split('.');
        let (header, payload, signature) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => return Err(AuthError::InvalidToken),
            };

        let parsed: Header = decode_segment(header)?;
        if parsed.alg != ALGORITHM {
            log::debug!("rejecting token signed with {}", parsed.alg);
            return Err(AuthError::InvalidToken);
        }

        let signature = base64::decode(signature, base64::Variant::UrlSafeNoPadding)
            .map_err(|_| AuthError::InvalidToken)?;
        let signing_input = &token[..header.len() + 1 + payload.len()];
        let expected = self.mac(signing_input.as_bytes());
        // Constant time; a length mismatch is a plain mismatch.
        if !utils::memcmp(expected.as_ref(), &signature) {
            return Err(AuthError::InvalidToken);
        }

        let claims: Claims = decode_segment(payload)?;
        if now.timestamp() > claims.exp {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    fn mac(&self, input: &[u8]) -> hmacsha256::Tag {
        let mut state = hmacsha256::State::init(&self.secret);
        state.update(input);
        state.finalize()
    }
}

fn encode_segment<T: Serialize>(value: &T) -> AuthResult<String> {
    let json = serde_json::to_vec(value).map_err(|e| AuthError::TokenEncoding(e.to_string()))?;
    Ok(base64::encode(json, base64::Variant::UrlSafeNoPadding))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> AuthResult<T> {
    let json = base64::decode(segment, base64::Variant::UrlSafeNoPadding)
        .map_err(|_| AuthError::InvalidToken)?;
    serde_json::from_slice(&json).map_err(|_| AuthError::InvalidToken)
}
