//! `secretctl integrity` — run the vault integrity checks.

use crate::audit::AuditSource;
use crate::cli::{output, vault_dir, Cli};
use crate::errors::{Result, SecretCtlError};
use crate::vault::VaultStore;

/// Execute the `integrity` command.
///
/// Runs on a locked vault; the audit chain check is covered by
/// `secretctl audit --verify`.
pub fn execute(cli: &Cli, repair: bool) -> Result<()> {
    let dir = vault_dir(cli)?;
    let store = VaultStore::open(&dir, AuditSource::Cli);

    if repair {
        store.repair()?;
        output::success("vault.meta rebuilt from vault_keys");
    }

    let report = store.check_integrity()?;
    output::print_integrity_report(&report);

    if let Some(first) = report.first_failure() {
        return Err(SecretCtlError::Corrupted(format!(
            "{}: {}",
            first.name, first.detail
        )));
    }
    output::success("Vault integrity verified");
    Ok(())
}
