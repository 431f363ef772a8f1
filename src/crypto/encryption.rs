//! AES-256-GCM authenticated encryption.
//!
//! Two shapes are exposed, matching the two places ciphertext lands in
//! the store:
//!
//! - **detached** — the nonce travels separately from the ciphertext.
//!   This is the primitive: the `vault_keys` row keeps the wrapped DEK
//!   and its nonce in separate columns.
//! - **prefixed** — `encrypt`/`decrypt` bundle the nonce in front of
//!   the ciphertext so record columns only need one blob:
//!   `[ 12-byte nonce | ciphertext + 16-byte tag ]`.
//!
//! Nonces are 96-bit random values drawn fresh for every seal.  On the
//! open path every failure collapses into the one opaque
//! `DecryptionFailed` — a caller (or an attacker feeding us data) can
//! never tell a bad key from a clipped blob from a flipped bit.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::errors::{Result, SecretCtlError};

/// Size of the AES-256-GCM nonce in bytes.
pub const NONCE_LEN: usize = 12;

fn cipher(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| SecretCtlError::EncryptionFailed("key must be 32 bytes".into()))
}

fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

/// Seal `plaintext`, returning the nonce and the ciphertext+tag as
/// separate values.
pub fn encrypt_detached(key: &[u8], plaintext: &[u8]) -> Result<([u8; NONCE_LEN], Vec<u8>)> {
    let nonce = fresh_nonce();
    let ciphertext = cipher(key)?
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| SecretCtlError::EncryptionFailed(format!("AEAD seal: {e}")))?;
    Ok((nonce, ciphertext))
}

/// Open a detached seal.  Opaque failure on any problem.
pub fn decrypt_detached(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_LEN {
        return Err(SecretCtlError::DecryptionFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SecretCtlError::DecryptionFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SecretCtlError::DecryptionFailed)
}

/// Seal `plaintext` into a single self-contained blob (nonce first).
pub fn encrypt(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let (nonce, ciphertext) = encrypt_detached(key, plaintext)?;
    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Open a blob produced by `encrypt`.
pub fn decrypt(key: &[u8], blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_LEN {
        return Err(SecretCtlError::DecryptionFailed);
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
    decrypt_detached(key, nonce, ciphertext)
}
