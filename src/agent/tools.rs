//! The agent tool surface.
//!
//! Every tool is metadata-safe by construction: `list`, `exists`, and
//! `list_fields` never touch field values; `get_masked` applies the
//! masking policy; `get_field` releases only non-sensitive fields.
//! The `run` family injects secrets into a child process environment
//! and returns sanitized output — plaintext never crosses the protocol
//! boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::agent::runner::{
    build_environment, effective_timeout, execute, validate_run_input, RunLimiter,
};
use crate::agent::sanitize::OutputSanitizer;
use crate::audit::{AuditOutcome, AuditRecord, AuditSource};
use crate::errors::{Result, SecretCtlError};
use crate::model::{resolve_field_name, SecretEntry};
use crate::policy::{resolve_binary, Policy};
use crate::vault::VaultStore;

/// Shared state behind every tool call.
pub struct AgentContext {
    pub store: Arc<VaultStore>,
    pub vault_dir: PathBuf,
    pub limiter: RunLimiter,
}

impl AgentContext {
    pub fn new(store: Arc<VaultStore>, vault_dir: PathBuf) -> Self {
        Self {
            store,
            vault_dir,
            limiter: RunLimiter::default(),
        }
    }

    /// Best-effort audit append from the tool layer.
    fn audit(&self, record: AuditRecord) {
        let _ = self.store.audit_event(record, false);
    }
}

// ---------------------------------------------------------------------------
// Argument and result shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListArgs {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub expiring_within_days: Option<i64>,
}

/// Metadata row released to the agent — flags, never content.
#[derive(Debug, Serialize)]
pub struct ToolSecretInfo {
    pub key: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub field_count: u32,
    pub has_notes: bool,
    pub has_url: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ExistsResult {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<ToolSecretInfo>,
}

#[derive(Debug, Serialize)]
pub struct MaskedField {
    pub value: String,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MaskedSecret {
    pub key: String,
    pub fields: BTreeMap<String, MaskedField>,
}

#[derive(Debug, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub sensitive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FieldValue {
    pub key: String,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct RunArgs {
    pub keys: Vec<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RunWithBindingsArgs {
    pub keys: Vec<String>,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub sanitized: bool,
}

// ---------------------------------------------------------------------------
// Read-only tools
// ---------------------------------------------------------------------------

/// `list` — metadata for all secrets, optionally filtered by tag or
/// expiration horizon.  Never returns values.
pub fn list(ctx: &AgentContext, args: &ListArgs) -> Result<Vec<ToolSecretInfo>> {
    let infos = match (&args.tag, args.expiring_within_days) {
        (Some(tag), _) => ctx.store.list_by_tag(tag)?,
        (None, Some(days)) => ctx.store.list_expiring(Duration::days(days))?,
        (None, None) => ctx.store.list_secrets_with_metadata()?,
    };
    Ok(infos.into_iter().map(to_tool_info).collect())
}

/// `exists` — presence plus metadata for one key.
pub fn exists(ctx: &AgentContext, key: &str) -> Result<ExistsResult> {
    let infos = ctx.store.list_secrets_with_metadata()?;
    let info = infos.into_iter().find(|i| i.key == key);
    Ok(ExistsResult {
        exists: info.is_some(),
        info: info.map(to_tool_info),
    })
}

/// `get_masked` — per-field view with sensitive values masked and
/// non-sensitive values in full.
pub fn get_masked(ctx: &AgentContext, key: &str) -> Result<MaskedSecret> {
    let entry = ctx.store.get_secret(key)?;
    let fields = entry
        .fields
        .iter()
        .map(|(name, field)| {
            let value = if field.sensitive {
                mask_value(&field.value)
            } else {
                field.value.clone()
            };
            (
                name.clone(),
                MaskedField {
                    value,
                    sensitive: field.sensitive,
                    hint: field.hint.clone(),
                },
            )
        })
        .collect();
    Ok(MaskedSecret {
        key: key.to_string(),
        fields,
    })
}

/// `list_fields` — field metadata for one key; no values.
pub fn list_fields(ctx: &AgentContext, key: &str) -> Result<Vec<FieldInfo>> {
    let entry = ctx.store.get_secret(key)?;
    Ok(entry
        .fields
        .iter()
        .map(|(name, field)| FieldInfo {
            name: name.clone(),
            sensitive: field.sensitive,
            hint: field.hint.clone(),
            aliases: field.aliases.clone(),
            input_type: field.input_type.clone(),
        })
        .collect())
}

/// `get_field` — the value of one non-sensitive field.  Sensitive
/// fields are denied outright, after alias resolution.
pub fn get_field(ctx: &AgentContext, key: &str, field_name: &str) -> Result<FieldValue> {
    let entry = ctx.store.get_secret(key)?;
    let (canonical, field) = resolve_field_name(&entry.fields, field_name)
        .ok_or_else(|| SecretCtlError::FieldNotFound(field_name.to_string(), key.to_string()))?;

    if field.sensitive {
        let err = SecretCtlError::CommandDenied(format!(
            "field '{canonical}' of '{key}' is sensitive and is never released to agents — \
             use run or run_with_bindings to inject it"
        ));
        let mut record = AuditRecord::failure("secret.get_field", AuditSource::Mcp, key, &err);
        record.result = AuditOutcome::Denied;
        ctx.audit(record);
        return Err(err);
    }

    Ok(FieldValue {
        key: key.to_string(),
        field: canonical,
        value: field.value.clone(),
    })
}

// ---------------------------------------------------------------------------
// run / run_with_bindings
// ---------------------------------------------------------------------------

/// `run` — execute a command with secrets injected as environment
/// variables derived from their key names.
pub fn run(ctx: &AgentContext, args: &RunArgs) -> Result<RunResult> {
    let _permit = ctx.limiter.try_acquire()?;
    validate_run_input(&args.command, &args.args, args.keys.len())?;

    let (policy, resolved) = authorize(ctx, &args.command, &args.args)?;

    // Alias expansion happens before pattern expansion so aliased
    // patterns can themselves contain globs.
    let patterns = match &args.env {
        Some(label) => policy.expand_aliases(label, &args.keys)?,
        None => args.keys.clone(),
    };
    let selected = expand_patterns(ctx, &patterns)?;

    let mut injected: Vec<(String, Zeroizing<String>)> = Vec::with_capacity(selected.len());
    for key in &selected {
        let entry = ctx.store.get_secret(key)?;
        reject_expired(key, &entry)?;
        let value = injection_value(key, &entry)?;
        let env_name = env_name_for_key(key, args.prefix.as_deref());
        injected.push((env_name, Zeroizing::new(value)));
    }

    execute_sanitized(ctx, &resolved, &args.args, injected, args.timeout_secs, &selected)
}

/// `run_with_bindings` — execute a command with the environment
/// populated from each secret's `bindings` map.
pub fn run_with_bindings(ctx: &AgentContext, args: &RunWithBindingsArgs) -> Result<RunResult> {
    let _permit = ctx.limiter.try_acquire()?;
    validate_run_input(&args.command, &args.args, args.keys.len())?;

    let (_policy, resolved) = authorize(ctx, &args.command, &args.args)?;

    let mut injected: Vec<(String, Zeroizing<String>)> = Vec::new();
    for key in &args.keys {
        let entry = ctx.store.get_secret(key)?;
        reject_expired(key, &entry)?;
        if entry.bindings.is_empty() {
            return Err(SecretCtlError::InvalidBinding(format!(
                "secret '{key}' has no bindings"
            )));
        }
        for (env_name, field_name) in &entry.bindings {
            let (_, field) = resolve_field_name(&entry.fields, field_name).ok_or_else(|| {
                SecretCtlError::InvalidBinding(format!(
                    "binding '{env_name}' of '{key}' references missing field '{field_name}'"
                ))
            })?;
            injected.push((env_name.clone(), Zeroizing::new(field.value.clone())));
        }
    }

    execute_sanitized(
        ctx,
        &resolved,
        &args.args,
        injected,
        args.timeout_secs,
        &args.keys,
    )
}

/// Load the policy, resolve the binary, and evaluate the decision
/// against both the original string and the resolved path.  Denials
/// are audited.
fn authorize(
    ctx: &AgentContext,
    command: &str,
    args: &[String],
) -> Result<(Policy, PathBuf)> {
    let policy = Policy::load(&ctx.vault_dir)?;
    let resolved = resolve_binary(command)?;

    let full_line = if args.is_empty() {
        command.to_string()
    } else {
        format!("{command} {}", args.join(" "))
    };

    if let Err(err) = policy.is_command_allowed(command, &full_line, &resolved) {
        let mut record = AuditRecord::failure("secret.run", AuditSource::Mcp, "", &err);
        record.result = AuditOutcome::Denied;
        record = record.with_metadata("command", serde_json::json!(command));
        ctx.audit(record);
        return Err(err);
    }

    Ok((policy, resolved))
}

/// Expand key patterns (exact, `*`, `?`, `[...]`) against the current
/// key set.  Exact names must exist; a glob may match nothing.
fn expand_patterns(ctx: &AgentContext, patterns: &[String]) -> Result<Vec<String>> {
    let all_keys = ctx.store.list_secrets()?;
    let mut selected = Vec::new();

    for pattern in patterns {
        if pattern.contains(['*', '?', '[']) {
            let glob = glob::Pattern::new(pattern).map_err(|e| {
                SecretCtlError::InvalidKeyName(format!("bad key pattern '{pattern}': {e}"))
            })?;
            for key in all_keys.iter().filter(|k| glob.matches(k)) {
                if !selected.contains(key) {
                    selected.push(key.clone());
                }
            }
        } else {
            if !all_keys.contains(pattern) {
                return Err(SecretCtlError::SecretNotFound(pattern.clone()));
            }
            if !selected.contains(pattern) {
                selected.push(pattern.clone());
            }
        }
    }

    Ok(selected)
}

fn reject_expired(key: &str, entry: &SecretEntry) -> Result<()> {
    if entry.is_expired() {
        return Err(SecretCtlError::ExecutionFailed(format!(
            "secret '{key}' is expired"
        )));
    }
    Ok(())
}

/// The value `run` injects for a secret: its `value` field when
/// present, otherwise its single field.
fn injection_value(key: &str, entry: &SecretEntry) -> Result<String> {
    if let Some(field) = entry.fields.get("value") {
        return Ok(field.value.clone());
    }
    if entry.fields.len() == 1 {
        if let Some(field) = entry.fields.values().next() {
            return Ok(field.value.clone());
        }
    }
    Err(SecretCtlError::ExecutionFailed(format!(
        "secret '{key}' has multiple fields and no 'value' field — use run_with_bindings"
    )))
}

/// Derive an env-var name from a key: uppercase, non-alphanumerics to
/// underscores, optional prefix.
fn env_name_for_key(key: &str, prefix: Option<&str>) -> String {
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
    match prefix {
        Some(p) => format!("{p}{name}"),
        None => name,
    }
}

/// Build the environment, execute under the deadline, sanitize both
/// streams, wipe the raw buffers, and audit the outcome.
fn execute_sanitized(
    ctx: &AgentContext,
    resolved: &std::path::Path,
    args: &[String],
    injected: Vec<(String, Zeroizing<String>)>,
    timeout_secs: Option<u64>,
    keys: &[String],
) -> Result<RunResult> {
    let env = build_environment(&injected)?;
    let timeout = effective_timeout(timeout_secs);

    let key_list = keys.join(",");
    let outcome = execute(resolved, args, &env, timeout);
    drop(env);

    let mut raw = match outcome {
        Ok(raw) => raw,
        Err(err) => {
            ctx.audit(AuditRecord::failure(
                "secret.run",
                AuditSource::Mcp,
                &key_list,
                &err,
            ));
            return Err(err);
        }
    };

    let sanitizer = OutputSanitizer::new(
        injected
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str())),
    );
    let stdout = sanitizer.sanitize(&String::from_utf8_lossy(&raw.stdout));
    let stderr = sanitizer.sanitize(&String::from_utf8_lossy(&raw.stderr));
    raw.wipe();
    drop(injected);

    ctx.audit(
        AuditRecord::success("secret.run", AuditSource::Mcp, &key_list)
            .with_metadata("exit_code", serde_json::json!(raw.exit_code)),
    );

    Ok(RunResult {
        exit_code: raw.exit_code,
        stdout,
        stderr,
        duration_ms: raw.duration.as_millis() as u64,
        sanitized: true,
    })
}

fn to_tool_info(info: crate::model::SecretInfo) -> ToolSecretInfo {
    ToolSecretInfo {
        key: info.key,
        tags: info.tags,
        field_count: info.field_count,
        has_notes: info.has_notes,
        has_url: info.has_url,
        expires_at: info.expires_at,
        created_at: info.created_at,
        updated_at: info.updated_at,
    }
}

/// Masking policy: up to 4 chars all asterisks, 5-8 show the last 2,
/// 9 and longer show the last 4.
pub fn mask_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    let shown = match len {
        0..=4 => 0,
        5..=8 => 2,
        _ => 4,
    };
    let mut masked: String = "*".repeat(len - shown);
    masked.extend(&chars[len - shown..]);
    masked
}
