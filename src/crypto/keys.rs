//! DEK wrapper and HKDF-SHA256 subkey derivation.
//!
//! From the data-encryption key we derive independent sub-keys with
//! distinct context labels:
//! - `secretctl/audit/v1`      — audit log HMAC key
//! - `secretctl/backup/enc/v1` — backup payload encryption key
//! - `secretctl/backup/mac/v1` — backup HMAC key
//!
//! HKDF (RFC 5869) uses the DEK as input keying material and the label
//! as `info`, so the sub-keys are mutually independent.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::errors::{Result, SecretCtlError};

/// Length of all keys in this module (256 bits).
pub const KEY_LEN: usize = 32;

/// HKDF context label for the audit MAC key.
pub const AUDIT_MAC_CONTEXT: &[u8] = b"secretctl/audit/v1";

/// HKDF context label for the backup encryption key.
pub const BACKUP_ENC_CONTEXT: &[u8] = b"secretctl/backup/enc/v1";

/// HKDF context label for the backup MAC key.
pub const BACKUP_MAC_CONTEXT: &[u8] = b"secretctl/backup/mac/v1";

/// Overwrite a buffer with zeroes in a way the compiler cannot elide.
///
/// The caller guarantees exclusive ownership of the buffer at the point
/// of wiping.
pub fn secure_wipe(buffer: &mut [u8]) {
    buffer.zeroize();
}

/// Run HKDF-SHA256 expand with the given `info` label.
///
/// The extract step is skipped and the key is used directly as the PRK:
/// the DEK is already uniform random (it came from the OS CSPRNG).
pub fn hkdf_derive(ikm: &[u8], info: &[u8]) -> Result<[u8; KEY_LEN]> {
    let hk = Hkdf::<Sha256>::new(None, ikm);

    let mut okm = [0u8; KEY_LEN];
    hk.expand(info, &mut okm)
        .map_err(|e| SecretCtlError::KeyDerivationFailed(format!("HKDF expand failed: {e}")))?;

    Ok(okm)
}

/// A 32-byte data-encryption key that zeroes its memory when dropped.
///
/// The DEK never leaves this wrapper: vault operations borrow the raw
/// bytes for the duration of a single encrypt/decrypt call.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct DataKey {
    bytes: [u8; KEY_LEN],
}

impl DataKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random DEK.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive the audit-log HMAC key.
    pub fn derive_audit_mac_key(&self) -> Result<[u8; KEY_LEN]> {
        hkdf_derive(&self.bytes, AUDIT_MAC_CONTEXT)
    }

    /// Wipe the key bytes in place.  Used by `lock()` before the wrapper
    /// itself is dropped, so the zeroing happens at a known point.
    pub fn wipe(&mut self) {
        self.bytes.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_wipe_zeroes_buffer() {
        let mut buf = vec![0xAAu8; 64];
        secure_wipe(&mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn subkeys_differ_by_context() {
        let dek = DataKey::new([0x11; KEY_LEN]);
        let audit = hkdf_derive(dek.as_bytes(), AUDIT_MAC_CONTEXT).unwrap();
        let enc = hkdf_derive(dek.as_bytes(), BACKUP_ENC_CONTEXT).unwrap();
        let mac = hkdf_derive(dek.as_bytes(), BACKUP_MAC_CONTEXT).unwrap();
        assert_ne!(audit, enc);
        assert_ne!(audit, mac);
        assert_ne!(enc, mac);
    }

    #[test]
    fn subkey_derivation_is_deterministic() {
        let dek = DataKey::new([0x22; KEY_LEN]);
        let a = dek.derive_audit_mac_key().unwrap();
        let b = dek.derive_audit_mac_key().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn generated_deks_are_unique() {
        let a = DataKey::generate();
        let b = DataKey::generate();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn wipe_zeroes_key_in_place() {
        let mut dek = DataKey::new([0x33; KEY_LEN]);
        dek.wipe();
        assert_eq!(dek.as_bytes(), &[0u8; KEY_LEN]);
    }
}
