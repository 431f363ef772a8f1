//! Versioned encrypted backup export/import.
//!
//! A backup file has this layout:
//!
//! ```text
//! [SECRETCTL: 9 bytes][header_len: 4 bytes LE][header JSON][AEAD payload][HMAC-SHA256: 32 bytes]
//! ```
//!
//! The payload is a JSON object `{vault_salt, vault_meta, vault_db,
//! audit_log?}` encrypted with AES-256-GCM.  The encryption key and the
//! MAC key are independent: both are HKDF-derived from either the
//! backup password (Argon2id over a fresh salt, `master` mode) or a
//! 32-byte keyfile (`key` mode).
//!
//! The HMAC covers every byte before the tag and is verified in
//! constant time before any decryption is attempted, so a wrong
//! password or a tampered file fails with an integrity error without
//! ever touching ciphertext.

use std::path::Path;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::audit::AUDIT_DIR;
use crate::crypto::encryption::{decrypt, encrypt};
use crate::crypto::keys::{hkdf_derive, BACKUP_ENC_CONTEXT, BACKUP_MAC_CONTEXT};
use crate::crypto::{derive_kek, generate_salt, secure_wipe, KdfParams, SALT_LEN};
use crate::errors::{Result, SecretCtlError};
use crate::model::SecretEntry;
use crate::vault::fsutil;
use crate::vault::store::{DB_FILE, META_FILE, SALT_FILE};
use crate::vault::VaultStore;

type HmacSha256 = Hmac<Sha256>;

/// Magic bytes at the start of every backup file.
const MAGIC: &[u8; 9] = b"SECRETCTL";

/// Current backup format version.
const BACKUP_VERSION: u32 = 1;

/// Size of the trailing HMAC tag.
const HMAC_LEN: usize = 32;

/// Fixed-size prefix: 9 (magic) + 4 (header_len).
const PREFIX_LEN: usize = 13;

/// Expected length of a backup keyfile.
const KEYFILE_LEN: usize = 32;

/// How the backup keys were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Argon2id over the backup password.
    Master,
    /// HKDF over a 32-byte keyfile.
    Key,
}

/// Key material supplied by the caller.
pub enum BackupCredentials<'a> {
    Master { password: &'a [u8] },
    Keyfile { bytes: &'a [u8] },
}

/// Argon2id parameters (and salt) stored in the header for `master`
/// mode so restore re-derives the exact same keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderKdfParams {
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

/// Plaintext backup header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupHeader {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub vault_version: u32,
    pub encryption_mode: EncryptionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_params: Option<HeaderKdfParams>,
    pub includes_audit: bool,
    pub secret_count: u64,
    pub checksum_algo: String,
}

/// The encrypted payload: the vault files, byte-for-byte.
#[derive(Serialize, Deserialize)]
struct BackupPayload {
    #[serde(with = "b64")]
    vault_salt: Vec<u8>,
    #[serde(with = "b64")]
    vault_meta: Vec<u8>,
    #[serde(with = "b64")]
    vault_db: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    audit_log: Option<Vec<u8>>,
}

/// What to do when a restored key already exists in the target vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Abort on the first existing key.
    #[default]
    Error,
    /// Keep the existing secret.
    Skip,
    /// Replace the existing secret.
    Overwrite,
}

/// Options for `restore_into`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RestoreOptions {
    pub conflict: ConflictPolicy,
    /// Decrypt and count everything, write nothing.
    pub dry_run: bool,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub total: u64,
    pub restored: u64,
    pub skipped: u64,
    pub dry_run: bool,
}

// ---------------------------------------------------------------------------
// Backup creation
// ---------------------------------------------------------------------------

/// Create an encrypted backup of the vault directory.
///
/// Works on a locked vault — the files are copied at rest.  Returns the
/// header that was written.
pub fn create_backup(
    vault_dir: &Path,
    dest: &Path,
    credentials: &BackupCredentials<'_>,
    include_audit: bool,
) -> Result<BackupHeader> {
    if !VaultStore::exists(vault_dir) {
        return Err(SecretCtlError::VaultNotFound(vault_dir.to_path_buf()));
    }

    let vault_salt = std::fs::read(vault_dir.join(SALT_FILE))?;
    let vault_meta = std::fs::read(vault_dir.join(META_FILE))?;
    let vault_db = std::fs::read(vault_dir.join(DB_FILE))?;
    let audit_path = vault_dir.join(AUDIT_DIR).join("audit.log");
    let audit_log = if include_audit && audit_path.exists() {
        Some(std::fs::read(&audit_path)?)
    } else {
        None
    };

    let secret_count = count_secrets(&vault_db)?;
    let vault_version = vault_meta_version(&vault_meta);

    // Derive independent encryption and MAC keys.
    let (mut enc_key, mut mac_key, kdf_params) = derive_backup_keys(credentials, None)?;

    let header = BackupHeader {
        version: BACKUP_VERSION,
        created_at: Utc::now(),
        vault_version,
        encryption_mode: match credentials {
            BackupCredentials::Master { .. } => EncryptionMode::Master,
            BackupCredentials::Keyfile { .. } => EncryptionMode::Key,
        },
        kdf_params,
        includes_audit: audit_log.is_some(),
        secret_count,
        checksum_algo: "sha256".to_string(),
    };

    let payload = BackupPayload {
        vault_salt,
        vault_meta,
        vault_db,
        audit_log,
    };
    let payload_json = serde_json::to_vec(&payload)
        .map_err(|e| SecretCtlError::SerializationError(format!("backup payload: {e}")))?;
    let ciphertext = encrypt(&enc_key, &payload_json)?;
    secure_wipe(&mut enc_key);

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| SecretCtlError::SerializationError(format!("backup header: {e}")))?;
    let header_len = u32::try_from(header_json.len())
        .map_err(|_| SecretCtlError::SerializationError("header too large".into()))?;

    let mut buf = Vec::with_capacity(PREFIX_LEN + header_json.len() + ciphertext.len() + HMAC_LEN);
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&header_len.to_le_bytes());
    buf.extend_from_slice(&header_json);
    buf.extend_from_slice(&ciphertext);

    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|e| SecretCtlError::EncryptionFailed(format!("HMAC init: {e}")))?;
    mac.update(&buf);
    buf.extend_from_slice(&mac.finalize().into_bytes());
    secure_wipe(&mut mac_key);

    fsutil::check_disk_space(dest.parent().unwrap_or(Path::new(".")), buf.len() as u64)?;
    fsutil::write_private_atomic(dest, &buf)?;

    Ok(header)
}

/// Read and parse only the header of a backup file (no key needed).
pub fn read_header(path: &Path) -> Result<BackupHeader> {
    let data = std::fs::read(path)?;
    let (header, _, _) = split_backup(&data)?;
    Ok(header)
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

/// Restore a backup into an empty directory, byte-for-byte.
///
/// Fails with `VaultAlreadyExists` when a vault is already present —
/// use `restore_into` to merge into an existing vault.
pub fn restore_to_dir(
    backup_path: &Path,
    credentials: &BackupCredentials<'_>,
    target_dir: &Path,
    dry_run: bool,
) -> Result<RestoreReport> {
    if VaultStore::exists(target_dir) {
        return Err(SecretCtlError::VaultAlreadyExists(target_dir.to_path_buf()));
    }

    let (header, payload) = verify_and_decrypt(backup_path, credentials)?;

    if dry_run {
        return Ok(RestoreReport {
            total: header.secret_count,
            restored: header.secret_count,
            skipped: 0,
            dry_run: true,
        });
    }

    fsutil::create_private_dir(target_dir)?;
    fsutil::check_disk_space(target_dir, payload.vault_db.len() as u64)?;
    fsutil::write_private_atomic(&target_dir.join(SALT_FILE), &payload.vault_salt)?;
    fsutil::write_private_atomic(&target_dir.join(META_FILE), &payload.vault_meta)?;
    fsutil::write_private_atomic(&target_dir.join(DB_FILE), &payload.vault_db)?;
    if let Some(audit) = &payload.audit_log {
        let audit_dir = target_dir.join(AUDIT_DIR);
        fsutil::create_private_dir(&audit_dir)?;
        fsutil::write_private_atomic(&audit_dir.join("audit.log"), audit)?;
    }

    Ok(RestoreReport {
        total: header.secret_count,
        restored: header.secret_count,
        skipped: 0,
        dry_run: false,
    })
}

/// Merge a backup into an existing, unlocked vault, record by record.
///
/// Requires a `master`-mode backup whose password also unlocks the
/// embedded vault — each secret is decrypted with the embedded DEK and
/// re-encrypted under the target vault's DEK.
pub fn restore_into(
    backup_path: &Path,
    credentials: &BackupCredentials<'_>,
    target: &VaultStore,
    options: RestoreOptions,
) -> Result<RestoreReport> {
    let BackupCredentials::Master { password } = credentials else {
        return Err(SecretCtlError::CommandFailed(
            "merging into an existing vault requires a master-password backup".into(),
        ));
    };

    let (_, payload) = verify_and_decrypt(backup_path, credentials)?;

    // Materialize the embedded vault in a scratch directory and unlock
    // it with the backup password.
    let scratch = tempdir_in_private()?;
    fsutil::write_private_atomic(&scratch.path().join(SALT_FILE), &payload.vault_salt)?;
    fsutil::write_private_atomic(&scratch.path().join(META_FILE), &payload.vault_meta)?;
    fsutil::write_private_atomic(&scratch.path().join(DB_FILE), &payload.vault_db)?;

    let embedded = VaultStore::open(scratch.path(), crate::audit::AuditSource::Cli);
    embedded.unlock(password)?;

    let existing: std::collections::HashSet<String> =
        target.list_secrets()?.into_iter().collect();

    let mut report = RestoreReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    for key in embedded.list_secrets()? {
        report.total += 1;
        let entry: SecretEntry = embedded.get_secret(&key)?;

        if existing.contains(&key) {
            match options.conflict {
                ConflictPolicy::Error => {
                    return Err(SecretCtlError::CommandFailed(format!(
                        "secret '{key}' already exists in the target vault"
                    )));
                }
                ConflictPolicy::Skip => {
                    report.skipped += 1;
                    continue;
                }
                ConflictPolicy::Overwrite => {}
            }
        }

        if !options.dry_run {
            // Strip the folder reference: folder ids are not portable
            // across vaults.
            let mut entry = entry;
            entry.folder = None;
            target.set_secret(&key, &entry)?;
        }
        report.restored += 1;
    }

    embedded.lock()?;
    Ok(report)
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

/// Verify the trailing HMAC (constant time) and decrypt the payload.
fn verify_and_decrypt(
    path: &Path,
    credentials: &BackupCredentials<'_>,
) -> Result<(BackupHeader, BackupPayload)> {
    let data = std::fs::read(path)?;
    let (header, ciphertext, stored_mac) = split_backup(&data)?;

    let stored_kdf = header.kdf_params.as_ref();
    let (mut enc_key, mut mac_key, _) = derive_backup_keys(credentials, stored_kdf)?;

    // MAC first, before any decryption-failure signal can leak.
    let covered = &data[..data.len() - HMAC_LEN];
    let mut mac = HmacSha256::new_from_slice(&mac_key)
        .map_err(|e| SecretCtlError::EncryptionFailed(format!("HMAC init: {e}")))?;
    mac.update(covered);
    let verdict = mac.verify_slice(stored_mac);
    secure_wipe(&mut mac_key);
    if verdict.is_err() {
        secure_wipe(&mut enc_key);
        return Err(SecretCtlError::HmacMismatch);
    }

    let payload_json = decrypt(&enc_key, ciphertext);
    secure_wipe(&mut enc_key);
    let payload_json = payload_json?;

    let payload: BackupPayload = serde_json::from_slice(&payload_json)
        .map_err(|e| SecretCtlError::InvalidFormat(format!("backup payload: {e}")))?;

    if payload.vault_salt.len() != SALT_LEN {
        return Err(SecretCtlError::Corrupted(format!(
            "embedded vault.salt must be {SALT_LEN} bytes"
        )));
    }

    Ok((header, payload))
}

/// Parse the fixed prefix and split header / ciphertext / MAC.
fn split_backup(data: &[u8]) -> Result<(BackupHeader, &[u8], &[u8])> {
    if data.len() < PREFIX_LEN + HMAC_LEN {
        return Err(SecretCtlError::InvalidFormat(
            "file too small to be a backup".into(),
        ));
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(SecretCtlError::InvalidFormat(
            "missing SECRETCTL magic bytes".into(),
        ));
    }

    let header_len = u32::from_le_bytes(
        data[MAGIC.len()..PREFIX_LEN]
            .try_into()
            .map_err(|_| SecretCtlError::InvalidFormat("bad header length".into()))?,
    ) as usize;

    let header_end = PREFIX_LEN + header_len;
    if header_end + HMAC_LEN > data.len() {
        return Err(SecretCtlError::InvalidFormat(
            "header length exceeds file size".into(),
        ));
    }

    let header: BackupHeader = serde_json::from_slice(&data[PREFIX_LEN..header_end])
        .map_err(|e| SecretCtlError::InvalidFormat(format!("backup header: {e}")))?;
    if header.version != BACKUP_VERSION {
        return Err(SecretCtlError::UnsupportedVersion {
            found: header.version,
            expected: BACKUP_VERSION,
        });
    }

    let ciphertext = &data[header_end..data.len() - HMAC_LEN];
    let stored_mac = &data[data.len() - HMAC_LEN..];
    Ok((header, ciphertext, stored_mac))
}

/// Derive the (encryption, MAC) key pair.
///
/// On creation `stored` is `None` and a fresh salt is generated; on
/// restore the header's pinned salt and costs are reused.
fn derive_backup_keys(
    credentials: &BackupCredentials<'_>,
    stored: Option<&HeaderKdfParams>,
) -> Result<([u8; 32], [u8; 32], Option<HeaderKdfParams>)> {
    match credentials {
        BackupCredentials::Master { password } => {
            let (salt, params) = match stored {
                Some(s) => (
                    s.salt.clone(),
                    KdfParams {
                        memory_kib: s.memory_kib,
                        iterations: s.iterations,
                        parallelism: s.parallelism,
                    },
                ),
                None => (generate_salt().to_vec(), KdfParams::default()),
            };
            let mut ikm = derive_kek(password, &salt, &params)?;
            let enc_key = hkdf_derive(&ikm, BACKUP_ENC_CONTEXT)?;
            let mac_key = hkdf_derive(&ikm, BACKUP_MAC_CONTEXT)?;
            secure_wipe(&mut ikm);
            Ok((
                enc_key,
                mac_key,
                Some(HeaderKdfParams {
                    salt,
                    memory_kib: params.memory_kib,
                    iterations: params.iterations,
                    parallelism: params.parallelism,
                }),
            ))
        }
        BackupCredentials::Keyfile { bytes } => {
            if bytes.len() != KEYFILE_LEN {
                return Err(SecretCtlError::InvalidFormat(format!(
                    "backup keyfile must be exactly {KEYFILE_LEN} bytes, got {}",
                    bytes.len()
                )));
            }
            let enc_key = hkdf_derive(bytes, BACKUP_ENC_CONTEXT)?;
            let mac_key = hkdf_derive(bytes, BACKUP_MAC_CONTEXT)?;
            Ok((enc_key, mac_key, None))
        }
    }
}

/// Count secrets in a serialized `vault.db`.
fn count_secrets(vault_db: &[u8]) -> Result<u64> {
    let scratch = tempdir_in_private()?;
    let db_path = scratch.path().join(DB_FILE);
    std::fs::write(&db_path, vault_db)?;
    let conn = rusqlite::Connection::open(&db_path)?;
    let count: u64 = conn.query_row("SELECT COUNT(*) FROM secrets", [], |row| row.get(0))?;
    Ok(count)
}

/// Version field of a serialized `vault.meta`, defaulting to 1.
fn vault_meta_version(vault_meta: &[u8]) -> u32 {
    serde_json::from_slice::<serde_json::Value>(vault_meta)
        .ok()
        .and_then(|v| v.get("version").and_then(|n| n.as_u64()))
        .map_or(1, |v| v as u32)
}

fn tempdir_in_private() -> Result<tempfile::TempDir> {
    tempfile::TempDir::new().map_err(SecretCtlError::Io)
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded byte fields
// ---------------------------------------------------------------------------

mod b64 {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(&s).map_err(serde::de::Error::custom)
    }
}

mod b64_opt {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        data: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_some(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value {
            Some(s) => BASE64
                .decode(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
