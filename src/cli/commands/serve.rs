//! `secretctl serve` — run the agent tool server on stdin/stdout.

use std::sync::Arc;

use crate::agent::tools::AgentContext;
use crate::audit::AuditSource;
use crate::cli::{output, prompt_password, vault_dir, Cli};
use crate::errors::Result;
use crate::vault::VaultStore;

/// Execute the `serve` command.
///
/// The master password arrives via `SECRETCTL_PASSWORD` (unset after
/// reading) or an interactive prompt; the vault stays unlocked for the
/// lifetime of the server and is locked on shutdown.
pub fn execute(cli: &Cli) -> Result<()> {
    let dir = vault_dir(cli)?;
    let store = VaultStore::open(&dir, AuditSource::Mcp);

    let password = prompt_password()?;
    let warnings = store.unlock(password.as_bytes())?;
    drop(password);
    for w in warnings {
        output::warning(&w);
    }

    let store = Arc::new(store);
    let ctx = Arc::new(AgentContext::new(Arc::clone(&store), dir));

    let result = crate::agent::serve_stdio(ctx);
    store.lock()?;
    result
}
