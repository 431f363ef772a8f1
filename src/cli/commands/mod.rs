//! One module per subcommand.

pub mod audit_cmd;
pub mod backup_cmd;
pub mod completions;
pub mod delete;
pub mod get;
pub mod init;
pub mod integrity;
pub mod list;
pub mod restore;
pub mod run;
pub mod serve;
pub mod set;

use std::sync::Arc;

use crate::audit::AuditSource;
use crate::cli::{output, prompt_password, vault_dir, Cli};
use crate::errors::Result;
use crate::vault::VaultStore;

/// Open and unlock the vault for a CLI command, printing any
/// non-blocking warnings (permission drift, disk nearly full).
pub fn unlock_vault(cli: &Cli) -> Result<Arc<VaultStore>> {
    let dir = vault_dir(cli)?;
    let store = VaultStore::open(&dir, AuditSource::Cli);
    let password = prompt_password()?;
    let warnings = store.unlock(password.as_bytes())?;
    for w in warnings {
        output::warning(&w);
    }
    Ok(Arc::new(store))
}
