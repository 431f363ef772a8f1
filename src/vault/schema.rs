//! SQLite schema and linear, idempotent migrations for `vault.db`.
//!
//! Version history:
//! - v1: `vault_keys`, single-value `secrets` (encrypted_value only),
//!   `schema_version`.
//! - v2: multi-field columns on `secrets` (encrypted_fields,
//!   encrypted_bindings, schema, field_count).
//! - v3: metadata/organization columns (encrypted_metadata, tags,
//!   expires_at, folder_id) and the `folders` table.
//!
//! Each migration checks for column existence before altering, so a
//! partially-migrated database can be migrated again safely.  The whole
//! run happens inside one transaction.

use rusqlite::Connection;

use crate::errors::Result;

/// The schema version this build reads and writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Create all tables at the current version (fresh vault).
pub fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vault_keys (
            id            INTEGER PRIMARY KEY CHECK (id = 1),
            encrypted_dek BLOB NOT NULL,
            dek_nonce     BLOB NOT NULL,
            salt          BLOB NOT NULL,
            kdf_params    TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS secrets (
            key_hash           TEXT PRIMARY KEY,
            encrypted_key      BLOB NOT NULL,
            encrypted_value    BLOB,
            encrypted_fields   BLOB,
            encrypted_bindings BLOB,
            encrypted_metadata BLOB,
            schema             INTEGER,
            field_count        INTEGER NOT NULL DEFAULT 0,
            folder_id          INTEGER REFERENCES folders(id),
            tags               TEXT,
            hints              TEXT,
            expires_at         TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS folders (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL UNIQUE,
            parent_id  INTEGER REFERENCES folders(id),
            created_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            migrated_at TEXT NOT NULL
        );",
    )?;
    record_version(conn, CURRENT_SCHEMA_VERSION)?;
    Ok(())
}

/// The highest recorded schema version, or 1 for a database that
/// predates version bookkeeping.
pub fn recorded_version(conn: &Connection) -> Result<u32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(1);
    }
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(1))
}

/// Run all pending migrations up to the current version.
///
/// Idempotent: re-running on an up-to-date database is a no-op.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let from = recorded_version(conn)?;
    if from >= CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;

    if from < 2 {
        migrate_to_v2(&tx)?;
        record_version(&tx, 2)?;
    }
    if from < 3 {
        migrate_to_v3(&tx)?;
        record_version(&tx, 3)?;
    }

    tx.commit()?;
    Ok(())
}

/// v1 → v2: multi-field secret columns.
fn migrate_to_v2(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "secrets", "encrypted_fields", "BLOB")?;
    add_column_if_missing(conn, "secrets", "encrypted_bindings", "BLOB")?;
    add_column_if_missing(conn, "secrets", "schema", "INTEGER")?;
    add_column_if_missing(conn, "secrets", "field_count", "INTEGER NOT NULL DEFAULT 0")?;
    Ok(())
}

/// v2 → v3: metadata, tags, plaintext field hints, expiration,
/// folders.
fn migrate_to_v3(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "secrets", "encrypted_metadata", "BLOB")?;
    add_column_if_missing(conn, "secrets", "tags", "TEXT")?;
    add_column_if_missing(conn, "secrets", "hints", "TEXT")?;
    add_column_if_missing(conn, "secrets", "expires_at", "TEXT")?;
    add_column_if_missing(conn, "secrets", "folder_id", "INTEGER REFERENCES folders(id)")?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS folders (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            name       TEXT NOT NULL UNIQUE,
            parent_id  INTEGER REFERENCES folders(id),
            created_at TEXT NOT NULL
        );",
    )?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            migrated_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}

fn record_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, migrated_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// ALTER TABLE ADD COLUMN, but only if the column is absent.
fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    if column_exists(conn, table, column)? {
        return Ok(());
    }
    conn.execute_batch(&format!(
        "ALTER TABLE {table} ADD COLUMN {column} {definition};"
    ))?;
    Ok(())
}

/// True when `table` already has `column` (PRAGMA table_info).
pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Create a minimal v1 database (legacy layout).  Test-only: used to
/// exercise the migration path and legacy row promotion.
#[cfg(test)]
pub fn create_v1_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE vault_keys (
            id            INTEGER PRIMARY KEY CHECK (id = 1),
            encrypted_dek BLOB NOT NULL,
            dek_nonce     BLOB NOT NULL,
            salt          BLOB NOT NULL,
            kdf_params    TEXT NOT NULL,
            created_at    TEXT NOT NULL
        );
        CREATE TABLE secrets (
            key_hash        TEXT PRIMARY KEY,
            encrypted_key   BLOB NOT NULL,
            encrypted_value BLOB,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE TABLE schema_version (
            version     INTEGER PRIMARY KEY,
            migrated_at TEXT NOT NULL
        );
        INSERT INTO schema_version (version, migrated_at)
            VALUES (1, '1970-01-01T00:00:00Z');",
    )?;
    Ok(())
}
