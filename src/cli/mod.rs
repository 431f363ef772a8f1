//! CLI module — Clap argument parser, output helpers, and command
//! implementations.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;
use zeroize::Zeroizing;

use crate::config::Settings;
use crate::errors::{Result, SecretCtlError};

/// Minimum password length to prevent trivially weak passwords.
const MIN_PASSWORD_LEN: usize = 8;

/// Environment variable that may carry the master password.  It is
/// unset immediately after being read — it is the sole secret channel
/// into the process.
pub const PASSWORD_ENV: &str = "SECRETCTL_PASSWORD";

/// secretctl: encrypted secrets manager with an AI-agent tool server.
#[derive(Parser)]
#[command(
    name = "secretctl",
    about = "Local encrypted secrets manager",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Vault directory (default: ~/.secretctl or .secretctl.toml)
    #[arg(long, global = true)]
    pub vault_dir: Option<String>,
}

/// All available subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Initialize a new vault
    Init,

    /// Set a secret (add or update)
    Set {
        /// Secret key (e.g. api/github)
        key: String,
        /// Value for the default `value` field (omit for prompt)
        value: Option<String>,
        /// Additional sensitive field as name=value (repeatable)
        #[arg(long = "field")]
        fields: Vec<String>,
        /// Additional non-sensitive field as name=value (repeatable)
        #[arg(long = "plain-field")]
        plain_fields: Vec<String>,
        /// Environment binding as ENV_NAME=field_name (repeatable)
        #[arg(long = "bind")]
        bindings: Vec<String>,
        /// Tag (repeatable, max 10)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Free-text note
        #[arg(long)]
        note: Option<String>,
        /// Related URL (http/https)
        #[arg(long)]
        url: Option<String>,
        /// Expiration timestamp (RFC3339)
        #[arg(long)]
        expires: Option<String>,
        /// Folder name (must exist)
        #[arg(long)]
        folder: Option<String>,
    },

    /// Get a secret's value
    Get {
        /// Secret key
        key: String,
        /// Specific field (default: value)
        #[arg(long)]
        field: Option<String>,
        /// Copy to the clipboard instead of printing (auto-clears
        /// after 30 seconds)
        #[arg(long)]
        copy: bool,
    },

    /// List secrets (metadata only)
    List {
        /// Only secrets carrying this tag
        #[arg(long)]
        tag: Option<String>,
        /// Only secrets expiring within N days
        #[arg(long)]
        expiring: Option<i64>,
    },

    /// Delete a secret
    Delete {
        /// Secret key
        key: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Run a command with secrets injected as environment variables
    Run {
        /// Keys to inject (repeatable; default: all)
        #[arg(short, long = "key")]
        keys: Vec<String>,
        /// Command and arguments (after --)
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },

    /// Create an encrypted backup
    Backup {
        /// Destination file
        output: String,
        /// Derive backup keys from a 32-byte keyfile instead of a password
        #[arg(long)]
        keyfile: Option<String>,
        /// Include the audit log in the backup
        #[arg(long)]
        include_audit: bool,
    },

    /// Restore from an encrypted backup
    Restore {
        /// Backup file
        file: String,
        /// Keyfile used at backup time (key mode)
        #[arg(long)]
        keyfile: Option<String>,
        /// Conflict policy when the target vault already exists:
        /// error, skip, or overwrite
        #[arg(long, default_value = "error")]
        conflict: String,
        /// Decrypt and count, but write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Show or verify the audit log
    Audit {
        /// Number of entries to show (default: 50)
        #[arg(long, default_value = "50")]
        last: usize,
        /// Only show entries at or after this RFC3339 timestamp
        #[arg(long)]
        since: Option<String>,
        /// Verify the full hash chain instead of listing
        #[arg(long)]
        verify: bool,
    },

    /// Check vault integrity
    Integrity {
        /// Rebuild vault.meta when missing or corrupt
        #[arg(long)]
        repair: bool,
    },

    /// Serve the agent tool protocol on stdin/stdout
    Serve,

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell)
        shell: String,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers used by multiple commands
// ---------------------------------------------------------------------------

/// Get the vault password, trying in order:
/// 1. `SECRETCTL_PASSWORD` env var (unset after reading)
/// 2. Interactive prompt
///
/// Returns `Zeroizing<String>` so the password is wiped on drop.
pub fn prompt_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        std::env::remove_var(PASSWORD_ENV);
        if !pw.is_empty() {
            return Ok(Zeroizing::new(pw));
        }
    }

    let pw = dialoguer::Password::new()
        .with_prompt("Enter vault password")
        .interact()
        .map_err(|e| SecretCtlError::CommandFailed(format!("password prompt: {e}")))?;
    Ok(Zeroizing::new(pw))
}

/// Prompt for a new password with confirmation (used during `init`).
///
/// Also respects `SECRETCTL_PASSWORD` for scripted usage.  Enforces a
/// minimum password length.
pub fn prompt_new_password() -> Result<Zeroizing<String>> {
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        std::env::remove_var(PASSWORD_ENV);
        if !pw.is_empty() {
            if pw.len() < MIN_PASSWORD_LEN {
                return Err(SecretCtlError::CommandFailed(format!(
                    "password must be at least {MIN_PASSWORD_LEN} characters"
                )));
            }
            return Ok(Zeroizing::new(pw));
        }
    }

    loop {
        let password = dialoguer::Password::new()
            .with_prompt("Choose vault password")
            .with_confirmation("Confirm vault password", "Passwords do not match, try again")
            .interact()
            .map_err(|e| SecretCtlError::CommandFailed(format!("password prompt: {e}")))?;

        if password.len() < MIN_PASSWORD_LEN {
            output::warning(&format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters. Try again."
            ));
            continue;
        }

        return Ok(Zeroizing::new(password));
    }
}

/// Resolve the vault directory: `--vault-dir` flag first, then
/// `.secretctl.toml`, then the default.
pub fn vault_dir(cli: &Cli) -> Result<PathBuf> {
    if let Some(dir) = &cli.vault_dir {
        return Ok(PathBuf::from(dir));
    }
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let settings = Settings::load(&base)?;
    Ok(settings.vault_path())
}

/// KDF parameters from settings (or defaults).
pub fn kdf_params(_cli: &Cli) -> Result<crate::crypto::KdfParams> {
    let base = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok(Settings::load(&base)?.kdf_params())
}

/// Parse a repeatable `name=value` argument.
pub fn parse_pair(raw: &str, what: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(SecretCtlError::CommandFailed(format!(
            "invalid {what} '{raw}' — expected name=value"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_accepts_name_value() {
        let (name, value) = parse_pair("token=abc", "field").unwrap();
        assert_eq!(name, "token");
        assert_eq!(value, "abc");
    }

    #[test]
    fn parse_pair_keeps_equals_in_value() {
        let (name, value) = parse_pair("url=a=b", "field").unwrap();
        assert_eq!(name, "url");
        assert_eq!(value, "a=b");
    }

    #[test]
    fn parse_pair_rejects_missing_separator() {
        assert!(parse_pair("novalue", "field").is_err());
        assert!(parse_pair("=value", "field").is_err());
    }
}
