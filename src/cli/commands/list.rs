//! `secretctl list` — metadata-only listing.

use chrono::Duration;

use crate::cli::{output, Cli};
use crate::errors::Result;

/// Execute the `list` command.
pub fn execute(cli: &Cli, tag: Option<&str>, expiring_days: Option<i64>) -> Result<()> {
    let store = super::unlock_vault(cli)?;

    let infos = match (tag, expiring_days) {
        (Some(tag), _) => store.list_by_tag(tag)?,
        (None, Some(days)) => store.list_expiring(Duration::days(days))?,
        (None, None) => store.list_secrets_with_metadata()?,
    };

    output::print_secrets_table(&infos);

    store.lock()?;
    Ok(())
}
