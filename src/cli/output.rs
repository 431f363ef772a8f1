//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::audit::AuditEvent;
use crate::model::SecretInfo;
use crate::vault::IntegrityReport;

/// Print a green success message.
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message.
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning.
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message.
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint.
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

/// Print a table of secret metadata (never values).
pub fn print_secrets_table(secrets: &[SecretInfo]) {
    if secrets.is_empty() {
        info("No secrets in this vault yet.");
        tip("Run `secretctl set <KEY>` to add your first secret.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Key", "Fields", "Tags", "Expires", "Updated"]);

    for s in secrets {
        table.add_row(vec![
            s.key.clone(),
            s.field_count.to_string(),
            s.tags.join(", "),
            s.expires_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            s.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{table}");
}

/// Print recent audit events, newest first.
pub fn print_audit_table(events: &[AuditEvent]) {
    if events.is_empty() {
        info("Audit log is empty.");
        return;
    }

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Seq", "Timestamp", "Operation", "Source", "Result", "Key"]);

    for e in events {
        table.add_row(vec![
            e.seq.to_string(),
            e.timestamp.clone(),
            e.operation.clone(),
            format!("{:?}", e.source).to_lowercase(),
            format!("{:?}", e.result).to_lowercase(),
            e.key.clone(),
        ]);
    }

    println!("{table}");
}

/// Print the integrity report, one line per check.
pub fn print_integrity_report(report: &IntegrityReport) {
    for check in &report.checks {
        if check.ok {
            success(&format!("{}: {}", check.name, check.detail));
        } else {
            error(&format!("{}: {}", check.name, check.detail));
        }
    }
}
