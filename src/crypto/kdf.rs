//! Password-based key derivation using Argon2id.
//!
//! The KEK is the only password-derived key in the hierarchy; it
//! exists just long enough to wrap or unwrap the DEK.  Cost parameters
//! are carried by [`KdfParams`], which validates itself against a
//! security floor and knows how to build its own hasher — the exact
//! costs chosen at `init` are serialized into `vault_keys.kdf_params`
//! and reused verbatim at every unlock, so compiled defaults can move
//! without stranding old vaults.

use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SecretCtlError};

/// Length of the KEK salt in bytes (128 bits).
pub const SALT_LEN: usize = 16;

/// Length of the derived key in bytes (256 bits, for AES-256).
const KEY_LEN: usize = 32;

/// Argon2id cost parameters, persisted alongside the encrypted DEK.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65 536 = 64 MiB).
    pub memory_kib: u32,
    /// Number of iterations (default: 3).
    pub iterations: u32,
    /// Parallelism lanes (default: 4).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// The weakest costs this build will accept.  A tampered or
    /// corrupted `kdf_params` record cannot downgrade the KDF below
    /// this line.
    const FLOOR: KdfParams = KdfParams {
        memory_kib: 65_536,
        iterations: 3,
        parallelism: 1,
    };

    /// Reject costs below the floor.
    pub fn validate(&self) -> Result<()> {
        let floor = Self::FLOOR;
        if self.memory_kib < floor.memory_kib {
            return Err(SecretCtlError::KeyDerivationFailed(format!(
                "memory cost {} KiB is below the {} KiB floor",
                self.memory_kib, floor.memory_kib
            )));
        }
        if self.iterations < floor.iterations {
            return Err(SecretCtlError::KeyDerivationFailed(format!(
                "iteration count {} is below the floor of {}",
                self.iterations, floor.iterations
            )));
        }
        if self.parallelism < floor.parallelism {
            return Err(SecretCtlError::KeyDerivationFailed(
                "parallelism must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Build the Argon2id hasher for these costs.
    fn hasher(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| {
            SecretCtlError::KeyDerivationFailed(format!("unusable Argon2 costs: {e}"))
        })?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Derive the 32-byte key-encryption key from the master password.
///
/// Deterministic in (password, salt, params); the salt must be the
/// vault's 16-byte `vault.salt`.
pub fn derive_kek(password: &[u8], salt: &[u8], params: &KdfParams) -> Result<[u8; KEY_LEN]> {
    if salt.len() != SALT_LEN {
        return Err(SecretCtlError::Corrupted(format!(
            "KEK salt must be {SALT_LEN} bytes, got {}",
            salt.len()
        )));
    }
    params.validate()?;

    let mut kek = [0u8; KEY_LEN];
    params
        .hasher()?
        .hash_password_into(password, salt, &mut kek)
        .map_err(|e| SecretCtlError::KeyDerivationFailed(format!("Argon2id: {e}")))?;
    Ok(kek)
}

/// Generate a cryptographically random 16-byte salt.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test-speed params: fast but on the enforced floor.
    fn test_params() -> KdfParams {
        KdfParams {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 1,
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let salt = [7u8; SALT_LEN];
        let k1 = derive_kek(b"password", &salt, &test_params()).unwrap();
        let k2 = derive_kek(b"password", &salt, &test_params()).unwrap();
        assert_eq!(k1, k2);
    }

    #[test]
    fn different_salt_different_key() {
        let k1 = derive_kek(b"password", &[1u8; SALT_LEN], &test_params()).unwrap();
        let k2 = derive_kek(b"password", &[2u8; SALT_LEN], &test_params()).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn different_password_different_key() {
        let salt = [9u8; SALT_LEN];
        let k1 = derive_kek(b"password-a", &salt, &test_params()).unwrap();
        let k2 = derive_kek(b"password-b", &salt, &test_params()).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn rejects_wrong_salt_length() {
        assert!(derive_kek(b"password", &[0u8; 32], &test_params()).is_err());
    }

    #[test]
    fn validate_rejects_weak_memory_cost() {
        let params = KdfParams {
            memory_kib: 1024,
            ..test_params()
        };
        assert!(params.validate().is_err());
        assert!(derive_kek(b"password", &[0u8; SALT_LEN], &params).is_err());
    }

    #[test]
    fn validate_rejects_weak_iterations() {
        let params = KdfParams {
            iterations: 1,
            ..test_params()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_parallelism() {
        let params = KdfParams {
            parallelism: 0,
            ..test_params()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn defaults_pass_validation() {
        assert!(KdfParams::default().validate().is_ok());
    }

    #[test]
    fn generated_salts_are_unique() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
