//! `secretctl backup` — create an encrypted backup.

use std::path::Path;

use crate::backup::{create_backup, BackupCredentials};
use crate::cli::{output, prompt_password, vault_dir, Cli};
use crate::errors::Result;

/// Execute the `backup` command.
pub fn execute(cli: &Cli, dest: &str, keyfile: Option<&str>, include_audit: bool) -> Result<()> {
    let dir = vault_dir(cli)?;

    let header = match keyfile {
        Some(path) => {
            let bytes = std::fs::read(path)?;
            let header = create_backup(
                &dir,
                Path::new(dest),
                &BackupCredentials::Keyfile { bytes: &bytes },
                include_audit,
            )?;
            header
        }
        None => {
            let password = prompt_password()?;
            create_backup(
                &dir,
                Path::new(dest),
                &BackupCredentials::Master {
                    password: password.as_bytes(),
                },
                include_audit,
            )?
        }
    };

    output::success(&format!(
        "Backup written to {dest} ({} secret{}{})",
        header.secret_count,
        if header.secret_count == 1 { "" } else { "s" },
        if header.includes_audit {
            ", audit log included"
        } else {
            ""
        }
    ));
    Ok(())
}
