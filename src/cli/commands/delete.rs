//! `secretctl delete` — remove a secret.

use crate::cli::{output, Cli};
use crate::errors::{Result, SecretCtlError};

/// Execute the `delete` command.
pub fn execute(cli: &Cli, key: &str, force: bool) -> Result<()> {
    if !force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete secret '{key}'?"))
            .default(false)
            .interact()
            .map_err(|e| SecretCtlError::CommandFailed(format!("confirm prompt: {e}")))?;
        if !confirmed {
            return Err(SecretCtlError::UserCancelled);
        }
    }

    let store = super::unlock_vault(cli)?;
    store.delete_secret(key)?;
    output::success(&format!("Secret '{key}' deleted"));

    store.lock()?;
    Ok(())
}
