//! `secretctl init` — create a new vault.

use crate::audit::AuditSource;
use crate::cli::{kdf_params, output, prompt_new_password, vault_dir, Cli};
use crate::errors::Result;
use crate::vault::VaultStore;

/// Execute the `init` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let dir = vault_dir(cli)?;
    let params = kdf_params(cli)?;
    let password = prompt_new_password()?;

    let store = VaultStore::init(&dir, password.as_bytes(), &params, AuditSource::Cli)?;

    output::success(&format!("Vault created at {}", store.dir().display()));
    output::tip("Run `secretctl set <KEY>` to add your first secret.");
    store.lock()?;
    Ok(())
}
