//! `secretctl run` — inject secrets into a child process.
//!
//! Unlike the agent `run` tool, the CLI variant acts with the user's
//! own authority: no policy check and no output sanitization.  The
//! child still receives a minimal hand-constructed environment.

use std::process::Command;

use zeroize::Zeroizing;

use crate::agent::runner::build_environment;
use crate::cli::{output, Cli};
use crate::errors::{Result, SecretCtlError};

/// Execute the `run` command.
pub fn execute(cli: &Cli, keys: &[String], command: &[String]) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Err(SecretCtlError::CommandFailed(
            "no command specified — use `secretctl run -- <command>`".into(),
        ));
    };

    let store = super::unlock_vault(cli)?;

    let selected = if keys.is_empty() {
        store.list_secrets()?
    } else {
        keys.to_vec()
    };

    let mut injected: Vec<(String, Zeroizing<String>)> = Vec::with_capacity(selected.len());
    for key in &selected {
        let entry = store.get_secret(key)?;
        let value = match (entry.fields.get("value"), entry.fields.values().next()) {
            (Some(field), _) => field.value.clone(),
            (None, Some(field)) if entry.fields.len() == 1 => field.value.clone(),
            _ => {
                return Err(SecretCtlError::CommandFailed(format!(
                    "secret '{key}' has multiple fields and no 'value' field"
                )));
            }
        };
        injected.push((env_name(key), Zeroizing::new(value)));
    }

    let env = build_environment(&injected)?;
    store.lock()?;

    output::success(&format!(
        "Injected {} secret{} into environment",
        injected.len(),
        if injected.len() == 1 { "" } else { "s" }
    ));

    let mut child = Command::new(program);
    child.args(args).env_clear();
    for (name, value) in &env {
        child.env(name, value.as_str());
    }

    let status = child.status()?;
    drop(env);
    drop(injected);

    // Forward the child's exit code.
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(SecretCtlError::ChildProcessFailed(code)),
        None => Err(SecretCtlError::CommandFailed(
            "child process terminated by signal".into(),
        )),
    }
}

/// Uppercased env-var name for a key (`api/github` → `API_GITHUB`).
fn env_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}
