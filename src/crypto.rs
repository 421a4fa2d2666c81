//! At-rest encryption and password hashing, both backed by libsodium.
//!
//! Payloads are sealed with XChaCha20-Poly1305. Every call draws a fresh
//! 24-byte nonce from libsodium's CSPRNG; the stored layout is
//! `nonce || ciphertext || tag`.

use sodiumoxide::crypto::aead::xchacha20poly1305_ietf as aead;
use sodiumoxide::crypto::pwhash::argon2id13;

use crate::error::CryptoError;

pub const KEY_LEN: usize = aead::KEYBYTES;
pub const NONCE_LEN: usize = aead::NONCEBYTES;
pub const TAG_LEN: usize = aead::TAGBYTES;

/// Initialise libsodium. Safe to call repeatedly and from several threads.
pub fn init() -> Result<(), CryptoError> {
    sodiumoxide::init().map_err(|_| CryptoError::Init)
}

/// Length of the stored payload for a plaintext of `plaintext_len` bytes.
pub fn sealed_len(plaintext_len: usize) -> usize {
    NONCE_LEN + plaintext_len + TAG_LEN
}

pub struct AtRestCipher {
    key: aead::Key,
}

impl AtRestCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        init()?;
        let key = aead::Key::from_slice(key).ok_or(CryptoError::InvalidKey {
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        Ok(Self { key })
    }

    /// Seal `plaintext`, binding `context` as associated data.
    pub fn seal(&self, plaintext: &[u8], context: &[u8]) -> Vec<u8> {
        let nonce = aead::gen_nonce();
        let ciphertext = aead::seal(plaintext, Some(context), &nonce, &self.key);

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(nonce.as_ref());
        payload.extend_from_slice(&ciphertext);
        payload
    }

    /// Open a payload produced by [`AtRestCipher::seal`] with the same context.
    pub fn open(&self, payload: &[u8], context: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if payload.len() < NONCE_LEN + TAG_LEN {
            return Err(CryptoError::Decryption);
        }
        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = aead::Nonce::from_slice(nonce).ok_or(CryptoError::Decryption)?;
        aead::open(ciphertext, Some(context), &nonce, &self.key)
            .map_err(|_| CryptoError::Decryption)
    }
}

/// Hash a password with argon2id at libsodium's interactive cost.
///
/// The result is the self-describing `$argon2id$...` string, salt included.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    init()?;
    let hashed = argon2id13::pwhash(
        password.as_bytes(),
        argon2id13::OPSLIMIT_INTERACTIVE,
        argon2id13::MEMLIMIT_INTERACTIVE,
    )
    .map_err(|_| CryptoError::Hashing)?;

    let bytes = hashed.as_ref();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8(bytes[..end].to_vec()).map_err(|_| CryptoError::Hashing)
}

/// Check `password` against an encoded hash from [`hash_password`].
///
/// Malformed hashes never verify.
pub fn verify_password(encoded: &str, password: &str) -> bool {
    let encoded = encoded.as_bytes();
    if encoded.len() >= argon2id13::HASHEDPASSWORDBYTES {
        return false;
    }

    let mut padded = [0u8; argon2id13::HASHEDPASSWORDBYTES];
    padded[..encoded.len()].copy_from_slice(encoded);
    match argon2id13::HashedPassword::from_slice(&padded) {
        Some(hashed) => argon2id13::pwhash_verify(&hashed, password.as_bytes()),
        None => false,
    }
}
