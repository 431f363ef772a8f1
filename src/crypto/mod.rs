//! Cryptographic primitives: Argon2id key derivation, AES-256-GCM
//! authenticated encryption, and HKDF subkey derivation.
//!
//! The key hierarchy is two levels deep:
//!
//! ```text
//! master password ──Argon2id──► KEK ──decrypts──► DEK (random, 32 bytes)
//!                                                  │
//!                            all record encryption ┘
//! ```
//!
//! Subkeys (audit MAC key, backup keys) are derived from the DEK with
//! HKDF-SHA256 and distinct context labels.

pub mod encryption;
pub mod kdf;
pub mod keys;

pub use encryption::{decrypt, encrypt};
pub use kdf::{derive_kek, generate_salt, KdfParams, SALT_LEN};
pub use keys::{secure_wipe, DataKey, KEY_LEN};
