//! Secret entries: key naming rules, bindings, metadata, and tags.
//!
//! The key grammar allows slash-separated hierarchies ("api/github")
//! while blocking path tricks (`..`, leading/trailing separators) and
//! the reserved `_internal/` / `_system/` prefixes.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SecretCtlError};
use crate::model::field::{resolve_field_name, validate_fields, FieldMap};

/// Maximum key length in characters.
const MAX_KEY_LEN: usize = 256;

/// Maximum notes length in bytes (10 KiB).
const MAX_NOTES_LEN: usize = 10 * 1024;

/// Maximum URL length in characters.
const MAX_URL_LEN: usize = 2048;

/// Maximum number of tags per secret.
const MAX_TAGS: usize = 10;

/// Key prefixes reserved for internal use.
const RESERVED_PREFIXES: &[&str] = &["_internal/", "_system/"];

/// Environment variable names that may never be used as binding or
/// injection targets.  Checked case-insensitively.
pub const BLOCKED_ENV_VARS: &[&str] = &[
    "SECRETCTL_PASSWORD",
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "BASH_ENV",
    "ENV",
    "SHELLOPTS",
    "BASHOPTS",
    "PERL5OPT",
    "PYTHONSTARTUP",
    "PYTHONPATH",
    "RUBYOPT",
    "NODE_OPTIONS",
    "IFS",
    "CDPATH",
    "GLOBIGNORE",
];

fn env_var_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

fn binding_env_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[A-Z_][A-Z0-9_]*$").expect("static regex"))
}

/// Free-text metadata attached to a secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Free-text notes, at most 10 KiB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// An http/https URL with a non-empty host, at most 2048 chars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.url.is_none()
    }
}

/// A full secret entry as stored in (and returned by) the vault.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretEntry {
    /// Named fields, canonical (lexicographic) order.
    pub fields: FieldMap,

    /// Environment-variable bindings: UPPER_SNAKE env name → field name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bindings: BTreeMap<String, String>,

    /// Notes and URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    /// Up to 10 tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Optional future expiration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Optional folder name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Set by the store; preserved across updates.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    /// Set by the store on every write.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl SecretEntry {
    /// An entry holding a single sensitive `value` field.
    pub fn single_value(value: impl Into<String>) -> Self {
        let mut fields = FieldMap::new();
        fields.insert(
            crate::model::field::LEGACY_FIELD_NAME.to_string(),
            crate::model::field::Field::sensitive(value),
        );
        Self {
            fields,
            ..Self::default()
        }
    }

    /// Validate every part of the entry against the model rules.
    ///
    /// Key validation is separate (`validate_key`) because the key is
    /// not part of the encrypted entry body.
    pub fn validate(&self) -> Result<()> {
        validate_fields(&self.fields)?;
        validate_bindings(&self.bindings, &self.fields)?;
        if let Some(metadata) = &self.metadata {
            validate_metadata(metadata)?;
        }
        validate_tags(&self.tags)?;
        if let Some(expires_at) = self.expires_at {
            if expires_at <= Utc::now() {
                return Err(SecretCtlError::InvalidField(
                    "expiration must be in the future".into(),
                ));
            }
        }
        Ok(())
    }

    /// True once the expiration timestamp has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Non-sensitive summary of a secret, as returned by the listing APIs
/// and the agent `list`/`exists` tools.  Never carries field values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretInfo {
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub field_count: u32,
    pub has_notes: bool,
    pub has_url: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validate a secret key name.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(SecretCtlError::InvalidKeyName("key cannot be empty".into()));
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(SecretCtlError::InvalidKeyName(format!(
            "key cannot exceed {MAX_KEY_LEN} characters"
        )));
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'/' | b'-'))
    {
        return Err(SecretCtlError::InvalidKeyName(format!(
            "key '{key}' contains invalid characters — only letters, digits, \
             '.', '_', '/', and '-' are allowed"
        )));
    }
    if key.starts_with('.') || key.starts_with('-') || key.starts_with('/') {
        return Err(SecretCtlError::InvalidKeyName(format!(
            "key '{key}' cannot start with '.', '-', or '/'"
        )));
    }
    if key.ends_with('/') {
        return Err(SecretCtlError::InvalidKeyName(format!(
            "key '{key}' cannot end with '/'"
        )));
    }
    if key.contains("..") {
        return Err(SecretCtlError::InvalidKeyName(format!(
            "key '{key}' cannot contain '..'"
        )));
    }
    for prefix in RESERVED_PREFIXES {
        if key.starts_with(prefix) {
            return Err(SecretCtlError::InvalidKeyName(format!(
                "prefix '{prefix}' is reserved"
            )));
        }
    }
    Ok(())
}

/// Validate an environment-variable name for injection into a child
/// process: POSIX grammar, no NUL, not on the blocked list.
///
/// This is the single validation point for bindings, alias-expansion
/// results, and `run` injection targets.
pub fn validate_env_var_name(name: &str) -> Result<()> {
    if !env_var_re().is_match(name) {
        return Err(SecretCtlError::InvalidEnvVarName(name.to_string()));
    }
    let upper = name.to_uppercase();
    if BLOCKED_ENV_VARS.iter().any(|blocked| *blocked == upper) {
        return Err(SecretCtlError::InvalidBinding(format!(
            "environment variable '{name}' is blocked"
        )));
    }
    Ok(())
}

/// Validate a bindings map against its field set: UPPER_SNAKE names,
/// case-insensitive uniqueness, no blocked targets, and every bound
/// field (or alias) present.
pub fn validate_bindings(bindings: &BTreeMap<String, String>, fields: &FieldMap) -> Result<()> {
    let mut seen: HashSet<String> = HashSet::new();

    for (env_name, field_name) in bindings {
        if !binding_env_re().is_match(env_name) {
            return Err(SecretCtlError::InvalidBinding(format!(
                "'{env_name}' is not an UPPER_SNAKE environment variable name"
            )));
        }
        validate_env_var_name(env_name)?;

        if !seen.insert(env_name.to_uppercase()) {
            return Err(SecretCtlError::InvalidBinding(format!(
                "environment variable '{env_name}' is bound more than once"
            )));
        }

        if resolve_field_name(fields, field_name).is_none() {
            return Err(SecretCtlError::InvalidBinding(format!(
                "binding '{env_name}' references missing field '{field_name}'"
            )));
        }
    }

    Ok(())
}

/// Validate notes and URL limits.
pub fn validate_metadata(metadata: &Metadata) -> Result<()> {
    if let Some(notes) = &metadata.notes {
        if notes.len() > MAX_NOTES_LEN {
            return Err(SecretCtlError::ValueTooLarge(format!(
                "notes are {} bytes (max {MAX_NOTES_LEN})",
                notes.len()
            )));
        }
    }
    if let Some(url) = &metadata.url {
        validate_url(url)?;
    }
    Ok(())
}

/// Validate an http/https URL with a non-empty host.
fn validate_url(url: &str) -> Result<()> {
    if url.chars().count() > MAX_URL_LEN {
        return Err(SecretCtlError::InvalidUrl(format!(
            "URL exceeds {MAX_URL_LEN} characters"
        )));
    }
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| {
            SecretCtlError::InvalidUrl("only http and https URLs are allowed".into())
        })?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    if host.is_empty() {
        return Err(SecretCtlError::InvalidUrl("URL host cannot be empty".into()));
    }
    Ok(())
}

/// Validate the tag list: at most 10 tags, each 1-64 chars of
/// `[A-Za-z0-9_-]`.
pub fn validate_tags(tags: &[String]) -> Result<()> {
    if tags.len() > MAX_TAGS {
        return Err(SecretCtlError::InvalidTag(format!(
            "too many tags: {} (max {MAX_TAGS})",
            tags.len()
        )));
    }
    for tag in tags {
        if tag.is_empty() || tag.len() > 64 {
            return Err(SecretCtlError::InvalidTag(format!(
                "tag '{tag}' must be 1-64 characters"
            )));
        }
        if !tag
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(SecretCtlError::InvalidTag(format!(
                "tag '{tag}' contains invalid characters"
            )));
        }
    }
    Ok(())
}
