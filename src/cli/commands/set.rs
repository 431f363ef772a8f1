//! `secretctl set` — add or update a secret.

use chrono::{DateTime, Utc};

use crate::cli::{output, parse_pair, Cli};
use crate::errors::{Result, SecretCtlError};
use crate::model::field::Field;
use crate::model::{Metadata, SecretEntry};

/// Arguments collected by the clap parser.
pub struct SetArgs<'a> {
    pub key: &'a str,
    pub value: Option<&'a str>,
    pub fields: &'a [String],
    pub plain_fields: &'a [String],
    pub bindings: &'a [String],
    pub tags: &'a [String],
    pub note: Option<&'a str>,
    pub url: Option<&'a str>,
    pub expires: Option<&'a str>,
    pub folder: Option<&'a str>,
}

/// Execute the `set` command.
pub fn execute(cli: &Cli, args: &SetArgs<'_>) -> Result<()> {
    let store = super::unlock_vault(cli)?;

    let mut entry = SecretEntry::default();

    // The positional value becomes the canonical `value` field; when
    // neither a value nor --field is given, prompt for it hidden.
    match args.value {
        Some(value) => {
            entry
                .fields
                .insert("value".to_string(), Field::sensitive(value));
        }
        None if args.fields.is_empty() && args.plain_fields.is_empty() => {
            let value = dialoguer::Password::new()
                .with_prompt(format!("Value for '{}'", args.key))
                .interact()
                .map_err(|e| SecretCtlError::CommandFailed(format!("value prompt: {e}")))?;
            entry
                .fields
                .insert("value".to_string(), Field::sensitive(value));
        }
        None => {}
    }

    for raw in args.fields {
        let (name, value) = parse_pair(raw, "field")?;
        entry.fields.insert(name, Field::sensitive(value));
    }
    for raw in args.plain_fields {
        let (name, value) = parse_pair(raw, "field")?;
        entry.fields.insert(name, Field::plain(value));
    }
    for raw in args.bindings {
        let (env_name, field_name) = parse_pair(raw, "binding")?;
        entry.bindings.insert(env_name, field_name);
    }

    entry.tags = args.tags.to_vec();
    if args.note.is_some() || args.url.is_some() {
        entry.metadata = Some(Metadata {
            notes: args.note.map(str::to_string),
            url: args.url.map(str::to_string),
        });
    }
    if let Some(expires) = args.expires {
        let at = DateTime::parse_from_rfc3339(expires)
            .map_err(|e| SecretCtlError::CommandFailed(format!("invalid --expires: {e}")))?
            .with_timezone(&Utc);
        entry.expires_at = Some(at);
    }
    entry.folder = args.folder.map(str::to_string);

    store.set_secret(args.key, &entry)?;
    output::success(&format!(
        "Secret '{}' saved ({} field{})",
        args.key,
        entry.fields.len(),
        if entry.fields.len() == 1 { "" } else { "s" }
    ));

    store.lock()?;
    Ok(())
}
