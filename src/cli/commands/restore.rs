//! `secretctl restore` — restore a backup into the vault directory.
//!
//! Into an empty directory the restore is file-level, byte-for-byte.
//! Onto an existing vault it is a record-level merge honoring the
//! conflict policy.

use std::path::Path;

use crate::backup::{
    restore_into, restore_to_dir, BackupCredentials, ConflictPolicy, RestoreOptions,
};
use crate::cli::{output, prompt_password, vault_dir, Cli};
use crate::errors::{Result, SecretCtlError};
use crate::vault::VaultStore;

/// Execute the `restore` command.
pub fn execute(
    cli: &Cli,
    file: &str,
    keyfile: Option<&str>,
    conflict: &str,
    dry_run: bool,
) -> Result<()> {
    let dir = vault_dir(cli)?;
    let conflict = parse_conflict(conflict)?;

    let keyfile_bytes = keyfile.map(std::fs::read).transpose()?;

    let report = if VaultStore::exists(&dir) {
        if keyfile_bytes.is_some() {
            return Err(SecretCtlError::CommandFailed(
                "merging into an existing vault requires a master-password backup".into(),
            ));
        }
        // One password serves both the backup and the target vault —
        // the common case of restoring one's own backup.
        let password = prompt_password()?;
        let credentials = BackupCredentials::Master {
            password: password.as_bytes(),
        };

        let target = VaultStore::open(&dir, crate::audit::AuditSource::Cli);
        let warnings = target.unlock(password.as_bytes())?;
        for w in warnings {
            output::warning(&w);
        }
        let report = restore_into(
            Path::new(file),
            &credentials,
            &target,
            RestoreOptions { conflict, dry_run },
        )?;
        target.lock()?;
        report
    } else {
        let credentials = match &keyfile_bytes {
            Some(bytes) => BackupCredentials::Keyfile { bytes },
            None => {
                // Bind the password for the duration of the restore.
                let password = prompt_password()?;
                return finish(restore_to_dir(
                    Path::new(file),
                    &BackupCredentials::Master {
                        password: password.as_bytes(),
                    },
                    &dir,
                    dry_run,
                )?);
            }
        };
        restore_to_dir(Path::new(file), &credentials, &dir, dry_run)?
    };

    finish(report)
}

fn finish(report: crate::backup::RestoreReport) -> Result<()> {
    let prefix = if report.dry_run { "[dry run] " } else { "" };
    output::success(&format!(
        "{prefix}Restored {} of {} secret(s), skipped {}",
        report.restored, report.total, report.skipped
    ));
    Ok(())
}

fn parse_conflict(raw: &str) -> Result<ConflictPolicy> {
    match raw {
        "error" => Ok(ConflictPolicy::Error),
        "skip" => Ok(ConflictPolicy::Skip),
        "overwrite" => Ok(ConflictPolicy::Overwrite),
        other => Err(SecretCtlError::CommandFailed(format!(
            "unknown conflict policy '{other}' — use error, skip, or overwrite"
        ))),
    }
}
