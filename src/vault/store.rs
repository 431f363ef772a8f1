//! The vault store: lifecycle, envelope encryption, and every record
//! operation.
//!
//! One `VaultStore` is the ownership root for one storage directory.
//! The lifecycle is uninitialized → initialized-locked → unlocked →
//! locked; unlocking decrypts the DEK into memory, locking wipes it.
//!
//! Concurrency follows a readers-writer discipline: mutating
//! operations take the write lock, queries take the read lock.  The
//! SQLite handle sits behind its own mutex inside the shared state so
//! parallel readers can coexist on the outer lock.
//!
//! Listing operations never decrypt field values — they touch only
//! `encrypted_key` and `encrypted_metadata`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::audit::{AuditLog, AuditRecord, AuditSource, AuditVerifyReport};
use crate::crypto::encryption::{decrypt, decrypt_detached, encrypt, encrypt_detached};
use crate::crypto::{derive_kek, generate_salt, secure_wipe, DataKey, KdfParams, SALT_LEN};
use crate::errors::{Result, SecretCtlError};
use crate::model::field::FieldMap;
use crate::model::{convert_legacy_value, validate_key, Metadata, SecretEntry, SecretInfo};
use crate::vault::fsutil;
use crate::vault::integrity::{self, IntegrityReport};
use crate::vault::lockout::LockoutState;
use crate::vault::schema;

/// KEK salt file.
pub const SALT_FILE: &str = "vault.salt";

/// Vault metadata file.
pub const META_FILE: &str = "vault.meta";

/// The relational store.
pub const DB_FILE: &str = "vault.db";

/// Vault file-format version recorded in `vault.meta`.
const VAULT_VERSION: u32 = 1;

/// Per-row marker for multi-field secrets (`secrets.schema`).
const FIELD_SCHEMA_VERSION: u32 = 2;

/// Maximum folder nesting inspected by the cycle walk.
const MAX_FOLDER_DEPTH: usize = 10;

/// `vault.meta` contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultMeta {
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

/// A folder row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

/// In-memory state of an unlocked vault.
struct Session {
    dek: DataKey,
    conn: Mutex<Connection>,
    audit: AuditLog,
}

/// The per-directory vault root.
pub struct VaultStore {
    dir: PathBuf,
    source: AuditSource,
    session: RwLock<Option<Session>>,
}

impl VaultStore {
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// True when a vault has been initialized in `dir`.
    pub fn exists(dir: &Path) -> bool {
        dir.join(SALT_FILE).exists() || dir.join(DB_FILE).exists()
    }

    /// Create a handle for `dir` in the locked state.
    pub fn open(dir: impl Into<PathBuf>, source: AuditSource) -> Self {
        Self {
            dir: dir.into(),
            source,
            session: RwLock::new(None),
        }
    }

    /// Initialize a brand-new vault and leave it unlocked.
    ///
    /// Generates the KEK salt and a random DEK, wraps the DEK under the
    /// password-derived KEK, and writes every file with strict
    /// permissions.
    pub fn init(
        dir: impl Into<PathBuf>,
        password: &[u8],
        params: &KdfParams,
        source: AuditSource,
    ) -> Result<Self> {
        let dir = dir.into();
        if Self::exists(&dir) {
            return Err(SecretCtlError::VaultAlreadyExists(dir));
        }

        fsutil::create_private_dir(&dir)?;
        fsutil::check_disk_space(&dir, 1024 * 1024)?;

        // 1. KEK from the password.
        let salt = generate_salt();
        let mut kek = derive_kek(password, &salt, params)?;

        // 2. Fresh random DEK, wrapped under the KEK with a detached
        //    nonce (it gets its own column).
        let dek = DataKey::generate();
        let (dek_nonce, encrypted_dek) = encrypt_detached(&kek, dek.as_bytes())?;
        secure_wipe(&mut kek);

        let created_at = Utc::now();

        // 3. Files: salt, meta, database.
        fsutil::write_private_atomic(&dir.join(SALT_FILE), &salt)?;
        let meta = VaultMeta {
            version: VAULT_VERSION,
            created_at,
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| SecretCtlError::SerializationError(format!("vault.meta: {e}")))?;
        fsutil::write_private_atomic(&dir.join(META_FILE), &meta_bytes)?;

        let conn = Connection::open(dir.join(DB_FILE))?;
        fsutil::set_mode(&dir.join(DB_FILE), fsutil::FILE_MODE)?;
        schema::create_schema(&conn)?;

        let kdf_json = serde_json::to_string(params)
            .map_err(|e| SecretCtlError::SerializationError(format!("kdf params: {e}")))?;
        conn.execute(
            "INSERT INTO vault_keys (id, encrypted_dek, dek_nonce, salt, kdf_params, created_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                encrypted_dek,
                &dek_nonce[..],
                &salt[..],
                kdf_json,
                created_at.to_rfc3339()
            ],
        )?;

        // 4. Audit log keyed off the fresh DEK.
        let mac_key = dek.derive_audit_mac_key()?;
        let audit = AuditLog::open(&dir, mac_key, true)?;
        audit.append(AuditRecord::success("vault.init", source, ""))?;

        let store = Self {
            dir,
            source,
            session: RwLock::new(Some(Session {
                dek,
                conn: Mutex::new(conn),
                audit,
            })),
        };
        Ok(store)
    }

    /// Unlock the vault with the master password.
    ///
    /// Order matters: the lockout cooldown is checked before any KDF
    /// work, then the DEK is unwrapped, the schema is migrated, and the
    /// lockout state is cleared.  Returns non-blocking warnings (file
    /// permission drift, disk nearly full).
    pub fn unlock(&self, password: &[u8]) -> Result<Vec<String>> {
        let mut guard = self.write_session()?;
        if guard.is_some() {
            return Err(SecretCtlError::AlreadyUnlocked);
        }
        if !Self::exists(&self.dir) {
            return Err(SecretCtlError::VaultNotFound(self.dir.clone()));
        }

        // 1. Cooldown gate — no decryption attempt while it is active.
        let now = Utc::now();
        let mut lockout = LockoutState::load(&self.dir);
        lockout.check(now)?;

        // 2. Salt file (exactly 16 bytes).
        let salt = std::fs::read(self.dir.join(SALT_FILE))?;
        if salt.len() != SALT_LEN {
            return Err(SecretCtlError::Corrupted(format!(
                "vault.salt must be {SALT_LEN} bytes, found {}",
                salt.len()
            )));
        }

        // 3. Wrapped DEK and pinned KDF parameters.
        let mut conn = Connection::open(self.dir.join(DB_FILE))?;
        let (encrypted_dek, dek_nonce, kdf_json): (Vec<u8>, Vec<u8>, String) = conn
            .query_row(
                "SELECT encrypted_dek, dek_nonce, kdf_params FROM vault_keys WHERE id = 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| SecretCtlError::Corrupted("vault_keys row is missing".into()))?;
        let params: KdfParams = serde_json::from_str(&kdf_json)
            .map_err(|_| SecretCtlError::Corrupted("unparseable kdf_params".into()))?;

        // 4. Derive the KEK and unwrap the DEK.
        let mut kek = derive_kek(password, &salt, &params)?;
        let unwrapped = decrypt_detached(&kek, &dek_nonce, &encrypted_dek);
        secure_wipe(&mut kek);

        let mut dek_bytes = match unwrapped {
            Ok(bytes) => bytes,
            Err(_) => {
                lockout.record_failure(now);
                lockout.save(&self.dir)?;
                return Err(SecretCtlError::InvalidPassword);
            }
        };
        if dek_bytes.len() != 32 {
            secure_wipe(&mut dek_bytes);
            return Err(SecretCtlError::Corrupted("DEK has wrong length".into()));
        }
        let mut dek_array = [0u8; 32];
        dek_array.copy_from_slice(&dek_bytes);
        secure_wipe(&mut dek_bytes);
        let dek = DataKey::new(dek_array);
        secure_wipe(&mut dek_array);

        let failed_before = lockout.failed_attempts;
        LockoutState::clear(&self.dir)?;

        // 5. Idempotent schema migration before any user operation.
        schema::migrate(&mut conn)?;

        // 6. Permission drift warnings (non-blocking).
        let warnings = self.permission_warnings();

        let mac_key = dek.derive_audit_mac_key()?;
        let audit = AuditLog::open(&self.dir, mac_key, true)?;
        let mut record = AuditRecord::success("vault.unlock", self.source, "");
        if failed_before > 0 {
            record = record.with_metadata(
                "failed_attempts_before",
                serde_json::json!(failed_before),
            );
        }
        audit.append(record)?;

        *guard = Some(Session {
            dek,
            conn: Mutex::new(conn),
            audit,
        });
        Ok(warnings)
    }

    /// Lock the vault: log the event, wipe the DEK, close the database.
    pub fn lock(&self) -> Result<()> {
        let mut guard = self.write_session()?;
        let mut session = guard.take().ok_or(SecretCtlError::VaultLocked)?;

        // Log while the MAC key is still derivable, then wipe.
        session
            .audit
            .append(AuditRecord::success("vault.lock", self.source, ""))?;
        session.dek.wipe();
        drop(session);
        Ok(())
    }

    /// True while a session holds the DEK.
    pub fn is_unlocked(&self) -> bool {
        self.session.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// The storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // ------------------------------------------------------------------
    // Secret operations
    // ------------------------------------------------------------------

    /// Insert or update a secret.
    ///
    /// Everything is validated up front; all columns are written in one
    /// transaction.  The audit append is a precondition of success: if
    /// it fails after the commit, the error tells the caller the store
    /// and the journal may have diverged.
    pub fn set_secret(&self, key: &str, entry: &SecretEntry) -> Result<()> {
        validate_key(key)?;
        entry.validate()?;

        // Mutations take the exclusive lock.
        let guard = self.write_session()?;
        let session = require_unlocked(&guard)?;

        let result = self.set_secret_inner(session, key, entry);
        match result {
            Ok(()) => {
                session
                    .audit
                    .append(AuditRecord::success("secret.set", self.source, key))
                    .map_err(|e| {
                        SecretCtlError::AuditError(format!(
                            "secret was written but the audit append failed — store and \
                             journal may have diverged: {e}"
                        ))
                    })?;
                Ok(())
            }
            Err(e) => {
                let _ = session
                    .audit
                    .append(AuditRecord::failure("secret.set", self.source, key, &e));
                Err(e)
            }
        }
    }

    fn set_secret_inner(&self, session: &Session, key: &str, entry: &SecretEntry) -> Result<()> {
        let dek = session.dek.as_bytes();

        // Hints are display metadata and stay outside the encrypted
        // payload; strip them before sealing the field set.
        let mut hints: BTreeMap<String, String> = BTreeMap::new();
        let mut sealed_fields = entry.fields.clone();
        for (name, field) in sealed_fields.iter_mut() {
            if let Some(hint) = field.hint.take() {
                hints.insert(name.clone(), hint);
            }
        }

        let fields_json = serde_json::to_vec(&sealed_fields)
            .map_err(|e| SecretCtlError::SerializationError(format!("fields: {e}")))?;
        let hints_json = if hints.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&hints)
                    .map_err(|e| SecretCtlError::SerializationError(format!("hints: {e}")))?,
            )
        };
        let bindings_json = if entry.bindings.is_empty() {
            None
        } else {
            Some(
                serde_json::to_vec(&entry.bindings)
                    .map_err(|e| SecretCtlError::SerializationError(format!("bindings: {e}")))?,
            )
        };
        let metadata_json = match &entry.metadata {
            Some(m) if !m.is_empty() => Some(
                serde_json::to_vec(m)
                    .map_err(|e| SecretCtlError::SerializationError(format!("metadata: {e}")))?,
            ),
            _ => None,
        };

        let payload_len = fields_json.len()
            + bindings_json.as_ref().map_or(0, Vec::len)
            + metadata_json.as_ref().map_or(0, Vec::len);
        fsutil::check_disk_space(&self.dir, payload_len as u64)?;

        // Fresh nonce per column per write.
        let encrypted_key = encrypt(dek, key.as_bytes())?;
        let encrypted_fields = encrypt(dek, &fields_json)?;
        let encrypted_bindings = bindings_json.map(|b| encrypt(dek, &b)).transpose()?;
        let encrypted_metadata = metadata_json.map(|m| encrypt(dek, &m)).transpose()?;

        let tags_json = if entry.tags.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&entry.tags)
                    .map_err(|e| SecretCtlError::SerializationError(format!("tags: {e}")))?,
            )
        };

        let conn = self.lock_conn(session)?;

        let folder_id = match &entry.folder {
            Some(name) => Some(self.folder_id_by_name(&conn, name)?),
            None => None,
        };

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO secrets (key_hash, encrypted_key, encrypted_value, encrypted_fields,
                                  encrypted_bindings, encrypted_metadata, schema, field_count,
                                  folder_id, tags, hints, expires_at, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
             ON CONFLICT(key_hash) DO UPDATE SET
                 encrypted_key      = excluded.encrypted_key,
                 encrypted_value    = NULL,
                 encrypted_fields   = excluded.encrypted_fields,
                 encrypted_bindings = excluded.encrypted_bindings,
                 encrypted_metadata = excluded.encrypted_metadata,
                 schema             = excluded.schema,
                 field_count        = excluded.field_count,
                 folder_id          = excluded.folder_id,
                 tags               = excluded.tags,
                 hints              = excluded.hints,
                 expires_at         = excluded.expires_at,
                 updated_at         = excluded.updated_at",
            rusqlite::params![
                key_hash(key),
                encrypted_key,
                encrypted_fields,
                encrypted_bindings,
                encrypted_metadata,
                FIELD_SCHEMA_VERSION,
                entry.fields.len() as u32,
                folder_id,
                tags_json,
                hints_json,
                entry.expires_at.map(|t| t.to_rfc3339()),
                now,
            ],
        )?;
        Ok(())
    }

    /// Decrypt and return one secret in the canonical multi-field
    /// shape.  Legacy single-value rows are auto-promoted.
    pub fn get_secret(&self, key: &str) -> Result<SecretEntry> {
        validate_key(key)?;
        let guard = self.read_session()?;
        let session = require_unlocked(&guard)?;
        let dek = session.dek.as_bytes();

        let conn = self.lock_conn(session)?;
        let row = conn
            .query_row(
                "SELECT encrypted_value, encrypted_fields, encrypted_bindings,
                        encrypted_metadata, tags, hints, expires_at, folder_id,
                        created_at, updated_at
                 FROM secrets WHERE key_hash = ?1",
                [key_hash(key)],
                |row| {
                    Ok(RawSecretRow {
                        encrypted_value: row.get(0)?,
                        encrypted_fields: row.get(1)?,
                        encrypted_bindings: row.get(2)?,
                        encrypted_metadata: row.get(3)?,
                        tags: row.get(4)?,
                        hints: row.get(5)?,
                        expires_at: row.get(6)?,
                        folder_id: row.get(7)?,
                        created_at: row.get(8)?,
                        updated_at: row.get(9)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| SecretCtlError::SecretNotFound(key.to_string()))?;

        let mut fields: FieldMap = match (&row.encrypted_fields, &row.encrypted_value) {
            (Some(blob), _) => {
                let json = decrypt(dek, blob)?;
                serde_json::from_slice(&json)
                    .map_err(|e| SecretCtlError::SerializationError(format!("fields: {e}")))?
            }
            // Legacy row: single encrypted value, promoted on read.
            (None, Some(blob)) => convert_legacy_value(decrypt(dek, blob)?)?,
            (None, None) => {
                return Err(SecretCtlError::Corrupted(format!(
                    "secret '{key}' has neither fields nor a legacy value"
                )));
            }
        };

        // Re-attach the plaintext hints to their fields.
        if let Some(json) = &row.hints {
            let hints: BTreeMap<String, String> = serde_json::from_str(json)
                .map_err(|e| SecretCtlError::SerializationError(format!("hints: {e}")))?;
            for (name, hint) in hints {
                if let Some(field) = fields.get_mut(&name) {
                    field.hint = Some(hint);
                }
            }
        }

        let bindings: BTreeMap<String, String> = match &row.encrypted_bindings {
            Some(blob) => {
                let json = decrypt(dek, blob)?;
                serde_json::from_slice(&json)
                    .map_err(|e| SecretCtlError::SerializationError(format!("bindings: {e}")))?
            }
            None => BTreeMap::new(),
        };

        let metadata: Option<Metadata> = match &row.encrypted_metadata {
            Some(blob) => {
                let json = decrypt(dek, blob)?;
                Some(
                    serde_json::from_slice(&json).map_err(|e| {
                        SecretCtlError::SerializationError(format!("metadata: {e}"))
                    })?,
                )
            }
            None => None,
        };

        let folder = match row.folder_id {
            Some(id) => self.folder_name_by_id(&conn, id)?,
            None => None,
        };

        Ok(SecretEntry {
            fields,
            bindings,
            metadata,
            tags: parse_tags(row.tags.as_deref())?,
            expires_at: parse_timestamp(row.expires_at.as_deref())?,
            folder,
            created_at: parse_timestamp(Some(&row.created_at))?,
            updated_at: parse_timestamp(Some(&row.updated_at))?,
        })
    }

    /// Key names only, sorted.  Field values are never touched.
    pub fn list_secrets(&self) -> Result<Vec<String>> {
        let guard = self.read_session()?;
        let session = require_unlocked(&guard)?;
        let dek = session.dek.as_bytes();
        let conn = self.lock_conn(session)?;

        let mut stmt = conn.prepare("SELECT encrypted_key FROM secrets")?;
        let blobs = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut keys = Vec::with_capacity(blobs.len());
        for blob in blobs {
            let bytes = decrypt(dek, &blob)?;
            keys.push(String::from_utf8(bytes).map_err(|_| {
                SecretCtlError::Corrupted("secret key is not valid UTF-8".into())
            })?);
        }
        keys.sort();
        Ok(keys)
    }

    /// Canonical listings with key, tags, expiration, and decrypted
    /// metadata — never field values.
    pub fn list_secrets_with_metadata(&self) -> Result<Vec<SecretInfo>> {
        self.list_filtered(|_| true)
    }

    /// Listings restricted to one tag.
    pub fn list_by_tag(&self, tag: &str) -> Result<Vec<SecretInfo>> {
        let tag = tag.to_string();
        self.list_filtered(move |info| info.tags.iter().any(|t| *t == tag))
    }

    /// Listings restricted to secrets expiring within `within`.
    pub fn list_expiring(&self, within: Duration) -> Result<Vec<SecretInfo>> {
        let horizon = Utc::now() + within;
        self.list_filtered(move |info| info.expires_at.is_some_and(|at| at <= horizon))
    }

    fn list_filtered<F>(&self, keep: F) -> Result<Vec<SecretInfo>>
    where
        F: Fn(&SecretInfo) -> bool,
    {
        let guard = self.read_session()?;
        let session = require_unlocked(&guard)?;
        let dek = session.dek.as_bytes();
        let conn = self.lock_conn(session)?;

        let mut stmt = conn.prepare(
            "SELECT encrypted_key, encrypted_metadata, field_count, tags,
                    expires_at, created_at, updated_at
             FROM secrets",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, Option<Vec<u8>>>(1)?,
                    row.get::<_, u32>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut infos = Vec::new();
        for (enc_key, enc_meta, field_count, tags, expires_at, created_at, updated_at) in rows {
            let key = String::from_utf8(decrypt(dek, &enc_key)?).map_err(|_| {
                SecretCtlError::Corrupted("secret key is not valid UTF-8".into())
            })?;
            let metadata: Option<Metadata> = match enc_meta {
                Some(blob) => Some(serde_json::from_slice(&decrypt(dek, &blob)?).map_err(
                    |e| SecretCtlError::SerializationError(format!("metadata: {e}")),
                )?),
                None => None,
            };
            let info = SecretInfo {
                key,
                tags: parse_tags(tags.as_deref())?,
                field_count,
                has_notes: metadata.as_ref().is_some_and(|m| m.notes.is_some()),
                has_url: metadata.as_ref().is_some_and(|m| m.url.is_some()),
                metadata,
                expires_at: parse_timestamp(expires_at.as_deref())?,
                created_at: parse_timestamp(Some(&created_at))?.unwrap_or_else(Utc::now),
                updated_at: parse_timestamp(Some(&updated_at))?.unwrap_or_else(Utc::now),
            };
            if keep(&info) {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }

    /// Delete one secret.  Audit append is mandatory-for-success, like
    /// `set_secret`.
    pub fn delete_secret(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let guard = self.write_session()?;
        let session = require_unlocked(&guard)?;

        let deleted = {
            let conn = self.lock_conn(session)?;
            conn.execute("DELETE FROM secrets WHERE key_hash = ?1", [key_hash(key)])?
        };
        if deleted == 0 {
            let err = SecretCtlError::SecretNotFound(key.to_string());
            let _ = session
                .audit
                .append(AuditRecord::failure("secret.delete", self.source, key, &err));
            return Err(err);
        }

        session
            .audit
            .append(AuditRecord::success("secret.delete", self.source, key))
            .map_err(|e| {
                SecretCtlError::AuditError(format!(
                    "secret was deleted but the audit append failed — store and journal \
                     may have diverged: {e}"
                ))
            })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Folders
    // ------------------------------------------------------------------

    /// Create a folder, optionally nested under a parent.
    pub fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<i64> {
        if name.is_empty() || name.len() > 64 {
            return Err(SecretCtlError::InvalidFolder(
                "folder name must be 1-64 characters".into(),
            ));
        }
        let guard = self.write_session()?;
        let session = require_unlocked(&guard)?;
        let conn = self.lock_conn(session)?;

        let parent_id = match parent {
            Some(p) => Some(self.folder_id_by_name(&conn, p)?),
            None => None,
        };
        conn.execute(
            "INSERT INTO folders (name, parent_id, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, parent_id, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Re-parent a folder, rejecting cycles with a bounded walk.
    pub fn move_folder(&self, name: &str, new_parent: Option<&str>) -> Result<()> {
        let guard = self.write_session()?;
        let session = require_unlocked(&guard)?;
        let conn = self.lock_conn(session)?;

        let folder_id = self.folder_id_by_name(&conn, name)?;
        let parent_id = match new_parent {
            Some(p) => {
                let pid = self.folder_id_by_name(&conn, p)?;
                self.check_folder_cycle(&conn, folder_id, pid)?;
                Some(pid)
            }
            None => None,
        };
        conn.execute(
            "UPDATE folders SET parent_id = ?1 WHERE id = ?2",
            rusqlite::params![parent_id, folder_id],
        )?;
        Ok(())
    }

    /// All folders.
    pub fn list_folders(&self) -> Result<Vec<Folder>> {
        let guard = self.read_session()?;
        let session = require_unlocked(&guard)?;
        let conn = self.lock_conn(session)?;

        let mut stmt =
            conn.prepare("SELECT id, name, parent_id FROM folders ORDER BY name")?;
        let folders = stmt
            .query_map([], |row| {
                Ok(Folder {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    parent_id: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(folders)
    }

    /// Walk from `candidate_parent` upward (at most 10 levels) and
    /// reject if `folder_id` is reachable — that would close a cycle.
    fn check_folder_cycle(
        &self,
        conn: &Connection,
        folder_id: i64,
        candidate_parent: i64,
    ) -> Result<()> {
        let mut current = Some(candidate_parent);
        for _ in 0..MAX_FOLDER_DEPTH {
            let Some(id) = current else { return Ok(()) };
            if id == folder_id {
                return Err(SecretCtlError::InvalidFolder(
                    "move would create a folder cycle".into(),
                ));
            }
            current = conn
                .query_row("SELECT parent_id FROM folders WHERE id = ?1", [id], |row| {
                    row.get::<_, Option<i64>>(0)
                })
                .optional()?
                .flatten();
        }
        Err(SecretCtlError::InvalidFolder(format!(
            "folder nesting exceeds {MAX_FOLDER_DEPTH} levels"
        )))
    }

    fn folder_id_by_name(&self, conn: &Connection, name: &str) -> Result<i64> {
        conn.query_row("SELECT id FROM folders WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?
        .ok_or_else(|| SecretCtlError::InvalidFolder(format!("folder '{name}' does not exist")))
    }

    fn folder_name_by_id(&self, conn: &Connection, id: i64) -> Result<Option<String>> {
        Ok(conn
            .query_row("SELECT name FROM folders WHERE id = ?1", [id], |row| {
                row.get(0)
            })
            .optional()?)
    }

    // ------------------------------------------------------------------
    // Integrity
    // ------------------------------------------------------------------

    /// Run every integrity check and return the report.  Works on a
    /// locked vault; the audit chain is verified only when unlocked
    /// (its MAC key derives from the DEK).
    pub fn check_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        if !Self::exists(&self.dir) {
            return Err(SecretCtlError::VaultNotFound(self.dir.clone()));
        }

        integrity::check_salt(&mut report, &self.dir);
        integrity::check_meta(&mut report, &self.dir);
        integrity::check_permissions(&mut report, &self.dir);

        let conn = Connection::open(self.dir.join(DB_FILE))?;
        integrity::check_database(&mut report, &conn)?;
        drop(conn);

        let guard = self.read_session()?;
        if let Some(session) = guard.as_ref() {
            let audit_report = session.audit.verify()?;
            match &audit_report.first_defect {
                None => report.push(
                    "audit",
                    true,
                    format!("{} events verified", audit_report.events_checked),
                ),
                Some((seq, reason)) => {
                    report.push("audit", false, format!("event {seq}: {reason}"));
                }
            }
        }

        Ok(report)
    }

    /// Verify the audit chain (requires the unlocked DEK).
    pub fn verify_audit(&self) -> Result<AuditVerifyReport> {
        let guard = self.read_session()?;
        let session = require_unlocked(&guard)?;
        session.audit.verify()
    }

    /// Query recent audit events, newest first.
    pub fn query_audit(&self, limit: usize, since: Option<&str>) -> Result<Vec<crate::audit::AuditEvent>> {
        let guard = self.read_session()?;
        let session = require_unlocked(&guard)?;
        session.audit.query(limit, since)
    }

    /// Recreate a missing or corrupt `vault.meta` from
    /// `vault_keys.created_at`.
    pub fn repair(&self) -> Result<()> {
        let conn = Connection::open(self.dir.join(DB_FILE))?;
        let created_at: String = conn
            .query_row("SELECT created_at FROM vault_keys WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .ok_or_else(|| SecretCtlError::Corrupted("vault_keys row is missing".into()))?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|_| SecretCtlError::Corrupted("vault_keys.created_at unparseable".into()))?
            .with_timezone(&Utc);

        let meta = VaultMeta {
            version: VAULT_VERSION,
            created_at,
        };
        let bytes = serde_json::to_vec_pretty(&meta)
            .map_err(|e| SecretCtlError::SerializationError(format!("vault.meta: {e}")))?;
        fsutil::write_private_atomic(&self.dir.join(META_FILE), &bytes)
    }

    /// Record an agent-side event (used by the tool server for `run`
    /// outcomes and denials).  Best-effort unless `required`.
    pub fn audit_event(&self, record: AuditRecord, required: bool) -> Result<()> {
        let guard = self.read_session()?;
        let session = require_unlocked(&guard)?;
        match session.audit.append(record) {
            Ok(_) => Ok(()),
            Err(e) if required => Err(e),
            Err(_) => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn read_session(&self) -> Result<std::sync::RwLockReadGuard<'_, Option<Session>>> {
        self.session
            .read()
            .map_err(|_| SecretCtlError::CommandFailed("vault lock poisoned".into()))
    }

    fn write_session(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<Session>>> {
        self.session
            .write()
            .map_err(|_| SecretCtlError::CommandFailed("vault lock poisoned".into()))
    }

    fn lock_conn<'a>(&self, session: &'a Session) -> Result<MutexGuard<'a, Connection>> {
        session
            .conn
            .lock()
            .map_err(|_| SecretCtlError::CommandFailed("database lock poisoned".into()))
    }

    fn permission_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(w) = fsutil::permission_warning(&self.dir, fsutil::DIR_MODE) {
            warnings.push(w);
        }
        for name in [SALT_FILE, META_FILE, DB_FILE, crate::vault::lockout::LOCKOUT_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                if let Some(w) = fsutil::permission_warning(&path, fsutil::FILE_MODE) {
                    warnings.push(w);
                }
            }
        }
        if let Ok(Some(w)) = fsutil::check_disk_space(&self.dir, 0) {
            warnings.push(w);
        }
        warnings
    }
}

struct RawSecretRow {
    encrypted_value: Option<Vec<u8>>,
    encrypted_fields: Option<Vec<u8>>,
    encrypted_bindings: Option<Vec<u8>>,
    encrypted_metadata: Option<Vec<u8>>,
    tags: Option<String>,
    hints: Option<String>,
    expires_at: Option<String>,
    folder_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

fn require_unlocked<'a>(guard: &'a Option<Session>) -> Result<&'a Session> {
    guard.as_ref().ok_or(SecretCtlError::VaultLocked)
}

/// SHA-256 hex of the plaintext key, used for row lookup.
fn key_hash(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn parse_tags(tags: Option<&str>) -> Result<Vec<String>> {
    match tags {
        Some(json) => serde_json::from_str(json)
            .map_err(|e| SecretCtlError::SerializationError(format!("tags: {e}"))),
        None => Ok(Vec::new()),
    }
}

fn parse_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(s) => Ok(Some(
            DateTime::parse_from_rfc3339(s)
                .map_err(|_| SecretCtlError::Corrupted(format!("bad timestamp '{s}'")))?
                .with_timezone(&Utc),
        )),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field::Field;
    use tempfile::TempDir;

    const PASSWORD: &[u8] = b"CorrectHorseBatteryStaple";

    fn fast_params() -> KdfParams {
        KdfParams {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 1,
        }
    }

    fn new_vault(dir: &Path) -> VaultStore {
        VaultStore::init(dir, PASSWORD, &fast_params(), AuditSource::Cli).unwrap()
    }

    fn entry_with_token(token: &str) -> SecretEntry {
        let mut fields = FieldMap::new();
        fields.insert("token".to_string(), Field::sensitive(token));
        SecretEntry {
            fields,
            tags: vec!["work".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn init_creates_files_with_strict_modes() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let _store = new_vault(&dir);

        assert_eq!(std::fs::read(dir.join(SALT_FILE)).unwrap().len(), SALT_LEN);
        assert!(dir.join(META_FILE).exists());
        assert!(dir.join(DB_FILE).exists());
        assert_eq!(fsutil::mode_of(&dir), Some(0o700));
        assert_eq!(fsutil::mode_of(&dir.join(SALT_FILE)), Some(0o600));
    }

    #[test]
    fn init_twice_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let _store = new_vault(&dir);
        let result = VaultStore::init(&dir, PASSWORD, &fast_params(), AuditSource::Cli);
        assert!(matches!(
            result,
            Err(SecretCtlError::VaultAlreadyExists(_))
        ));
    }

    #[test]
    fn set_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));

        store
            .set_secret("api/github", &entry_with_token("ghp_ABCD1234"))
            .unwrap();

        let entry = store.get_secret("api/github").unwrap();
        assert_eq!(entry.fields.get("token").unwrap().value, "ghp_ABCD1234");
        assert!(entry.fields.get("token").unwrap().sensitive);
        assert_eq!(entry.tags, vec!["work"]);
    }

    #[test]
    fn roundtrip_preserves_bindings_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));

        let mut entry = entry_with_token("tok");
        entry
            .bindings
            .insert("GITHUB_TOKEN".to_string(), "token".to_string());
        entry.metadata = Some(Metadata {
            notes: Some("deploy token".into()),
            url: Some("https://github.com/settings".into()),
        });

        store.set_secret("api/github", &entry).unwrap();
        let loaded = store.get_secret("api/github").unwrap();

        assert_eq!(loaded.bindings.get("GITHUB_TOKEN").unwrap(), "token");
        let metadata = loaded.metadata.unwrap();
        assert_eq!(metadata.notes.as_deref(), Some("deploy token"));
        assert_eq!(metadata.url.as_deref(), Some("https://github.com/settings"));
    }

    #[test]
    fn hints_are_stored_outside_the_encrypted_payload() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);

        let mut field = Field::sensitive("tok");
        field.hint = Some("rotate quarterly".to_string());
        let mut fields = FieldMap::new();
        fields.insert("token".to_string(), field);
        store
            .set_secret("k", &SecretEntry { fields, ..Default::default() })
            .unwrap();

        // The hint is readable straight off the row, no DEK involved,
        // and the sealed field blob does not contain it.
        let conn = Connection::open(dir.join(DB_FILE)).unwrap();
        let (hints, sealed): (String, Vec<u8>) = conn
            .query_row(
                "SELECT hints, encrypted_fields FROM secrets WHERE key_hash = ?1",
                [key_hash("k")],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(hints.contains("rotate quarterly"));
        assert!(!String::from_utf8_lossy(&sealed).contains("rotate quarterly"));

        // And it is re-attached on read.
        let entry = store.get_secret("k").unwrap();
        assert_eq!(
            entry.fields["token"].hint.as_deref(),
            Some("rotate quarterly")
        );
    }

    #[test]
    fn update_preserves_created_at() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));

        store.set_secret("k", &entry_with_token("v1")).unwrap();
        let created = store.get_secret("k").unwrap().created_at;

        store.set_secret("k", &entry_with_token("v2")).unwrap();
        let entry = store.get_secret("k").unwrap();

        assert_eq!(entry.created_at, created);
        assert_eq!(entry.fields.get("token").unwrap().value, "v2");
    }

    #[test]
    fn lock_then_operate_fails() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store.lock().unwrap();
        assert!(matches!(
            store.get_secret("x"),
            Err(SecretCtlError::VaultLocked)
        ));
        assert!(matches!(
            store.set_secret("x", &entry_with_token("v")),
            Err(SecretCtlError::VaultLocked)
        ));
    }

    #[test]
    fn unlock_wrong_password_fails() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        store.lock().unwrap();

        assert!(matches!(
            store.unlock(b"wrong"),
            Err(SecretCtlError::InvalidPassword)
        ));
        let warnings = store.unlock(PASSWORD).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert!(store.is_unlocked());
    }

    #[test]
    fn failed_unlocks_trigger_cooldown_without_kdf() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        store.lock().unwrap();

        for _ in 0..5 {
            assert!(matches!(
                store.unlock(b"wrong"),
                Err(SecretCtlError::InvalidPassword)
            ));
        }

        // Sixth attempt — even with the right password — is rejected
        // by the cooldown gate before any KDF work.
        let result = store.unlock(PASSWORD);
        match result {
            Err(SecretCtlError::CooldownActive { remaining_secs }) => {
                assert!(remaining_secs <= 30);
            }
            other => panic!("expected CooldownActive, got {other:?}"),
        }
        assert!(dir.join(crate::vault::lockout::LOCKOUT_FILE).exists());
    }

    #[test]
    fn successful_unlock_clears_lock_file() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        store.lock().unwrap();

        let _ = store.unlock(b"wrong");
        assert!(dir.join(crate::vault::lockout::LOCKOUT_FILE).exists());

        store.unlock(PASSWORD).unwrap();
        assert!(!dir.join(crate::vault::lockout::LOCKOUT_FILE).exists());
    }

    #[test]
    fn listings_carry_no_values() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store
            .set_secret("api/github", &entry_with_token("supersecret"))
            .unwrap();

        let keys = store.list_secrets().unwrap();
        assert_eq!(keys, vec!["api/github"]);

        let infos = store.list_secrets_with_metadata().unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].key, "api/github");
        assert_eq!(infos[0].field_count, 1);
        // The info type has no value field at all; double-check the
        // serialized form never contains the plaintext.
        let json = serde_json::to_string(&infos).unwrap();
        assert!(!json.contains("supersecret"));
    }

    #[test]
    fn list_by_tag_filters() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store.set_secret("a", &entry_with_token("v")).unwrap();
        let mut other = entry_with_token("v");
        other.tags = vec!["personal".to_string()];
        store.set_secret("b", &other).unwrap();

        let work = store.list_by_tag("work").unwrap();
        assert_eq!(work.len(), 1);
        assert_eq!(work[0].key, "a");
    }

    #[test]
    fn list_expiring_filters_by_horizon() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));

        let mut soon = entry_with_token("v");
        soon.expires_at = Some(Utc::now() + Duration::hours(1));
        store.set_secret("soon", &soon).unwrap();

        let mut later = entry_with_token("v");
        later.expires_at = Some(Utc::now() + Duration::days(60));
        store.set_secret("later", &later).unwrap();

        let expiring = store.list_expiring(Duration::days(7)).unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].key, "soon");
    }

    #[test]
    fn delete_removes_secret() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store.set_secret("k", &entry_with_token("v")).unwrap();
        store.delete_secret("k").unwrap();
        assert!(matches!(
            store.get_secret("k"),
            Err(SecretCtlError::SecretNotFound(_))
        ));
        assert!(matches!(
            store.delete_secret("k"),
            Err(SecretCtlError::SecretNotFound(_))
        ));
    }

    #[test]
    fn reopen_after_lock_preserves_data() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        {
            let store = new_vault(&dir);
            store.set_secret("k", &entry_with_token("persisted")).unwrap();
            store.lock().unwrap();
        }

        let store = VaultStore::open(&dir, AuditSource::Cli);
        store.unlock(PASSWORD).unwrap();
        let entry = store.get_secret("k").unwrap();
        assert_eq!(entry.fields.get("token").unwrap().value, "persisted");
    }

    #[test]
    fn unlock_missing_vault_fails() {
        let tmp = TempDir::new().unwrap();
        let store = VaultStore::open(tmp.path().join("nope"), AuditSource::Cli);
        assert!(matches!(
            store.unlock(PASSWORD),
            Err(SecretCtlError::VaultNotFound(_))
        ));
    }

    #[test]
    fn corrupted_salt_is_detected() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        store.lock().unwrap();

        std::fs::write(dir.join(SALT_FILE), b"short").unwrap();
        assert!(matches!(
            store.unlock(PASSWORD),
            Err(SecretCtlError::Corrupted(_))
        ));
    }

    #[test]
    fn integrity_report_on_healthy_vault() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store.set_secret("k", &entry_with_token("v")).unwrap();

        let report = store.check_integrity().unwrap();
        assert!(report.is_ok(), "unexpected failures: {report:?}");
    }

    #[test]
    fn integrity_flags_bad_meta() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        std::fs::write(dir.join(META_FILE), b"not json").unwrap();

        let report = store.check_integrity().unwrap();
        assert!(!report.is_ok());
        assert_eq!(report.first_failure().unwrap().name, "meta");
    }

    #[test]
    fn repair_rebuilds_meta() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        std::fs::remove_file(dir.join(META_FILE)).unwrap();

        store.repair().unwrap();

        let meta: VaultMeta =
            serde_json::from_slice(&std::fs::read(dir.join(META_FILE)).unwrap()).unwrap();
        assert_eq!(meta.version, VAULT_VERSION);
    }

    #[test]
    fn audit_chain_tracks_operations() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store.set_secret("k", &entry_with_token("v")).unwrap();
        store.delete_secret("k").unwrap();

        let report = store.verify_audit().unwrap();
        assert!(report.is_ok());
        // init + set + delete
        assert_eq!(report.events_checked, 3);

        let events = store.query_audit(10, None).unwrap();
        assert_eq!(events[0].operation, "secret.delete");
        assert_eq!(events[1].operation, "secret.set");
    }

    #[test]
    fn folder_assignment_roundtrips() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store.create_folder("infra", None).unwrap();

        let mut entry = entry_with_token("v");
        entry.folder = Some("infra".to_string());
        store.set_secret("db/prod", &entry).unwrap();

        let loaded = store.get_secret("db/prod").unwrap();
        assert_eq!(loaded.folder.as_deref(), Some("infra"));
    }

    #[test]
    fn folder_cycle_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        store.create_folder("a", None).unwrap();
        store.create_folder("b", Some("a")).unwrap();
        store.create_folder("c", Some("b")).unwrap();

        // a under c would close the loop a → b → c → a.
        assert!(matches!(
            store.move_folder("a", Some("c")),
            Err(SecretCtlError::InvalidFolder(_))
        ));
    }

    #[test]
    fn missing_folder_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let store = new_vault(&tmp.path().join("vault"));
        let mut entry = entry_with_token("v");
        entry.folder = Some("ghost".to_string());
        assert!(matches!(
            store.set_secret("k", &entry),
            Err(SecretCtlError::InvalidFolder(_))
        ));
    }

    #[test]
    fn legacy_row_promotes_to_field_model() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);

        // Plant a legacy row: encrypted_value set, encrypted_fields NULL.
        {
            let guard = store.read_session().unwrap();
            let session = guard.as_ref().unwrap();
            let encrypted_key = encrypt(session.dek.as_bytes(), b"pw").unwrap();
            let encrypted_value = encrypt(session.dek.as_bytes(), b"s3cret").unwrap();
            let conn = store.lock_conn(session).unwrap();
            conn.execute(
                "INSERT INTO secrets (key_hash, encrypted_key, encrypted_value,
                                      field_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)",
                rusqlite::params![
                    key_hash("pw"),
                    encrypted_key,
                    encrypted_value,
                    Utc::now().to_rfc3339()
                ],
            )
            .unwrap();
        }

        let entry = store.get_secret("pw").unwrap();
        let field = entry.fields.get("value").unwrap();
        assert_eq!(field.value, "s3cret");
        assert!(field.sensitive);
    }

    #[test]
    fn v1_database_is_migrated_on_unlock() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        store.lock().unwrap();

        // Downgrade the schema bookkeeping to v1 and drop the new
        // columns' version rows; unlock must bring it back.
        {
            let conn = Connection::open(dir.join(DB_FILE)).unwrap();
            conn.execute("DELETE FROM schema_version WHERE version > 1", [])
                .unwrap();
        }

        store.unlock(PASSWORD).unwrap();

        let conn = Connection::open(dir.join(DB_FILE)).unwrap();
        assert_eq!(
            schema::recorded_version(&conn).unwrap(),
            schema::CURRENT_SCHEMA_VERSION
        );
    }

    #[test]
    fn permission_drift_produces_unlock_warning() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        let store = new_vault(&dir);
        store.lock().unwrap();

        fsutil::set_mode(&dir.join(SALT_FILE), 0o644).unwrap();
        let warnings = store.unlock(PASSWORD).unwrap();
        assert!(warnings.iter().any(|w| w.contains("vault.salt")));
    }
}
