//! Vault integrity checking: database self-check, file shapes, and
//! permission discipline.

use std::path::Path;

use rusqlite::Connection;

use crate::crypto::SALT_LEN;
use crate::errors::Result;
use crate::vault::fsutil;
use crate::vault::store::{META_FILE, SALT_FILE};

/// One named check with its outcome.
#[derive(Debug, Clone)]
pub struct IntegrityCheck {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

/// The full integrity report returned by `check_integrity`.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub checks: Vec<IntegrityCheck>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    pub fn push(&mut self, name: &str, ok: bool, detail: impl Into<String>) {
        self.checks.push(IntegrityCheck {
            name: name.to_string(),
            ok,
            detail: detail.into(),
        });
    }

    /// The first failing check, if any.
    pub fn first_failure(&self) -> Option<&IntegrityCheck> {
        self.checks.iter().find(|c| !c.ok)
    }
}

/// Run the database engine's own integrity check.
pub fn check_database(report: &mut IntegrityReport, conn: &Connection) -> Result<()> {
    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    report.push(
        "database",
        verdict == "ok",
        if verdict == "ok" {
            "integrity_check passed".to_string()
        } else {
            verdict
        },
    );
    Ok(())
}

/// Verify `vault.salt` is exactly 16 bytes.
pub fn check_salt(report: &mut IntegrityReport, vault_dir: &Path) {
    let path = vault_dir.join(SALT_FILE);
    match std::fs::read(&path) {
        Ok(bytes) if bytes.len() == SALT_LEN => {
            report.push("salt", true, format!("{SALT_LEN} bytes"));
        }
        Ok(bytes) => {
            report.push(
                "salt",
                false,
                format!("expected {SALT_LEN} bytes, found {}", bytes.len()),
            );
        }
        Err(e) => report.push("salt", false, format!("unreadable: {e}")),
    }
}

/// Verify `vault.meta` parses and has the expected shape.
pub fn check_meta(report: &mut IntegrityReport, vault_dir: &Path) {
    let path = vault_dir.join(META_FILE);
    match std::fs::read(&path) {
        Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => {
                let has_version = value.get("version").and_then(|v| v.as_u64()).is_some();
                let has_created = value.get("created_at").and_then(|v| v.as_str()).is_some();
                if has_version && has_created {
                    report.push("meta", true, "version and created_at present");
                } else {
                    report.push("meta", false, "missing version or created_at");
                }
            }
            Err(e) => report.push("meta", false, format!("invalid JSON: {e}")),
        },
        Err(e) => report.push("meta", false, format!("unreadable: {e}")),
    }
}

/// Verify directory and file permission bits.
pub fn check_permissions(report: &mut IntegrityReport, vault_dir: &Path) {
    match fsutil::permission_warning(vault_dir, fsutil::DIR_MODE) {
        Some(warning) => report.push("permissions", false, warning),
        None => report.push("permissions", true, "vault directory is 0700"),
    }

    for name in [SALT_FILE, META_FILE, crate::vault::store::DB_FILE] {
        let path = vault_dir.join(name);
        if !path.exists() {
            report.push("permissions", false, format!("{name} is missing"));
            continue;
        }
        match fsutil::permission_warning(&path, fsutil::FILE_MODE) {
            Some(warning) => report.push("permissions", false, warning),
            None => report.push("permissions", true, format!("{name} is 0600")),
        }
    }
}
