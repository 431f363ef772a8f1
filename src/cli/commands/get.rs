//! `secretctl get` — print or copy a secret value.

use std::time::Duration;

use crate::cli::{output, Cli};
use crate::errors::{Result, SecretCtlError};
use crate::model::resolve_field_name;

/// How long a copied value stays on the clipboard.
const CLIPBOARD_TTL: Duration = Duration::from_secs(30);

/// Execute the `get` command.
pub fn execute(cli: &Cli, key: &str, field: Option<&str>, copy: bool) -> Result<()> {
    let store = super::unlock_vault(cli)?;
    let entry = store.get_secret(key)?;

    let field_name = field.unwrap_or("value");
    let (canonical, resolved) = resolve_field_name(&entry.fields, field_name)
        .ok_or_else(|| SecretCtlError::FieldNotFound(field_name.to_string(), key.to_string()))?;

    if copy {
        copy_with_auto_clear(&resolved.value)?;
        output::success(&format!(
            "Copied '{key}' ({canonical}) to the clipboard — clearing in 30s"
        ));
    } else {
        println!("{}", resolved.value);
    }

    store.lock()?;
    Ok(())
}

/// Place a value on the clipboard and clear it after 30 seconds if it
/// is still there unchanged.
fn copy_with_auto_clear(value: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| SecretCtlError::CommandFailed(format!("clipboard: {e}")))?;
    clipboard
        .set_text(value.to_string())
        .map_err(|e| SecretCtlError::CommandFailed(format!("clipboard: {e}")))?;

    std::thread::sleep(CLIPBOARD_TTL);

    // Only clear if the user has not copied something else meanwhile.
    if clipboard.get_text().map(|t| t == value).unwrap_or(false) {
        let _ = clipboard.set_text(String::new());
    }
    Ok(())
}
