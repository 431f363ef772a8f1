//! `secretctl audit` — inspect or verify the audit log.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::cli::{output, Cli};
use crate::errors::{Result, SecretCtlError};

/// Execute the `audit` command.
pub fn execute(cli: &Cli, last: usize, since: Option<&str>, verify: bool) -> Result<()> {
    // Normalize the floor to the journal's nanosecond timestamp format
    // so the lexicographic comparison in the query lines up.
    let since_floor = match since {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| SecretCtlError::CommandFailed(format!("invalid --since: {e}")))?
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        ),
        None => None,
    };

    let store = super::unlock_vault(cli)?;

    if verify {
        let report = store.verify_audit()?;
        match report.first_defect {
            None => {
                output::success(&format!(
                    "Audit chain verified: {} event(s), no defects",
                    report.events_checked
                ));
            }
            Some((seq, reason)) => {
                store.lock()?;
                return Err(SecretCtlError::AuditChainBroken { seq, reason });
            }
        }
    } else {
        let events = store.query_audit(last, since_floor.as_deref())?;
        output::print_audit_table(&events);
    }

    store.lock()?;
    Ok(())
}
