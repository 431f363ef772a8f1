//! Secret fields: named values with sensitivity flags and aliases.
//!
//! Field names are snake_case (`^[a-z][a-z0-9_]*$`, max 64 chars).
//! Within one secret, field names and aliases must be unique
//! case-insensitively so alias resolution is never ambiguous.
//!
//! A legacy single-valued secret is represented as exactly one field
//! named `value` with `sensitive = true`; `convert_legacy_value`
//! performs that promotion for readers.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::errors::{Result, SecretCtlError};

/// Maximum number of fields in one secret.
const MAX_FIELDS: usize = 100;

/// Maximum length of a field value in bytes (1 MiB).
const MAX_VALUE_LEN: usize = 1024 * 1024;

/// Maximum number of aliases per field.
const MAX_ALIASES: usize = 10;

/// Maximum length of a field hint in characters.
const MAX_HINT_LEN: usize = 256;

/// Canonical name of the single field in a legacy-promoted secret.
pub const LEGACY_FIELD_NAME: &str = "value";

/// Fields of a secret, keyed by canonical field name.
///
/// `BTreeMap` keeps the serialized form canonical: keys are always in
/// lexicographic order, so the same field set encrypts to the same JSON
/// bytes (modulo the random nonce).
pub type FieldMap = BTreeMap<String, Field>;

fn field_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new("^[a-z][a-z0-9_]*$").expect("static regex"))
}

/// A single named value inside a secret.
#[derive(Clone, Serialize, Deserialize, Zeroize)]
#[zeroize(drop)]
pub struct Field {
    /// The field value.  Wiped when the struct is dropped.
    pub value: String,

    /// Sensitive fields are never released to the agent endpoint in
    /// plaintext — only masked.  Defaults to true.
    #[serde(default = "default_sensitive")]
    pub sensitive: bool,

    /// Alternate names, resolved case-insensitively.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,

    /// Reserved for future schema validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// UI input hint: empty, "text", or "textarea".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,

    /// Display hint.  Never encrypted, never sensitive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

fn default_sensitive() -> bool {
    true
}

impl Field {
    /// A sensitive field with just a value.
    pub fn sensitive(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sensitive: true,
            aliases: Vec::new(),
            kind: None,
            input_type: None,
            hint: None,
        }
    }

    /// A non-sensitive field with just a value.
    pub fn plain(value: impl Into<String>) -> Self {
        let mut field = Self::sensitive(value);
        field.sensitive = false;
        field
    }
}

// The derived Debug would print the value; redact it instead.
impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("value", &"<redacted>")
            .field("sensitive", &self.sensitive)
            .field("aliases", &self.aliases)
            .finish_non_exhaustive()
    }
}

/// Validate a single field name against the snake_case grammar.
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 || !field_name_re().is_match(name) {
        return Err(SecretCtlError::InvalidFieldName(name.to_string()));
    }
    Ok(())
}

/// Validate a full field set: per-field limits plus global
/// case-insensitive uniqueness of names and aliases.
pub fn validate_fields(fields: &FieldMap) -> Result<()> {
    if fields.is_empty() {
        return Err(SecretCtlError::InvalidField(
            "a secret must have at least one field".into(),
        ));
    }
    if fields.len() > MAX_FIELDS {
        return Err(SecretCtlError::InvalidField(format!(
            "too many fields: {} (max {MAX_FIELDS})",
            fields.len()
        )));
    }

    let mut seen: HashSet<String> = HashSet::new();

    for (name, field) in fields {
        validate_field_name(name)?;

        if field.value.len() > MAX_VALUE_LEN {
            return Err(SecretCtlError::ValueTooLarge(format!(
                "field '{name}' value is {} bytes (max {MAX_VALUE_LEN})",
                field.value.len()
            )));
        }

        if field.aliases.len() > MAX_ALIASES {
            return Err(SecretCtlError::InvalidField(format!(
                "field '{name}' has {} aliases (max {MAX_ALIASES})",
                field.aliases.len()
            )));
        }

        if let Some(hint) = &field.hint {
            if hint.chars().count() > MAX_HINT_LEN {
                return Err(SecretCtlError::InvalidField(format!(
                    "field '{name}' hint exceeds {MAX_HINT_LEN} characters"
                )));
            }
        }

        match field.input_type.as_deref() {
            None | Some("") | Some("text") | Some("textarea") => {}
            Some(other) => {
                return Err(SecretCtlError::InvalidField(format!(
                    "field '{name}' has unknown input_type '{other}'"
                )));
            }
        }

        if !seen.insert(name.to_lowercase()) {
            return Err(SecretCtlError::InvalidField(format!(
                "field name '{name}' collides case-insensitively with another field or alias"
            )));
        }

        for alias in &field.aliases {
            validate_field_name(alias)?;
            if !seen.insert(alias.to_lowercase()) {
                return Err(SecretCtlError::InvalidField(format!(
                    "alias '{alias}' of field '{name}' collides case-insensitively \
                     with another field or alias"
                )));
            }
        }
    }

    Ok(())
}

/// Resolve a field by exact match, case-insensitive match, or alias —
/// in that order.  Returns the canonical field name and a copy of the
/// field; the original is never exposed for mutation.
pub fn resolve_field_name(fields: &FieldMap, name: &str) -> Option<(String, Field)> {
    // 1. Exact match on the canonical name.
    if let Some(field) = fields.get(name) {
        return Some((name.to_string(), field.clone()));
    }

    // 2. Case-insensitive match on canonical names.
    let lower = name.to_lowercase();
    for (canonical, field) in fields {
        if canonical.to_lowercase() == lower {
            return Some((canonical.clone(), field.clone()));
        }
    }

    // 3. Alias match, case-insensitive.
    for (canonical, field) in fields {
        if field.aliases.iter().any(|a| a.to_lowercase() == lower) {
            return Some((canonical.clone(), field.clone()));
        }
    }

    None
}

/// Promote a legacy single-value secret into the canonical field shape:
/// one sensitive field named `value`.
pub fn convert_legacy_value(bytes: Vec<u8>) -> Result<FieldMap> {
    let value = String::from_utf8(bytes).map_err(|e| {
        let mut bad = e.into_bytes();
        bad.zeroize();
        SecretCtlError::SerializationError("legacy secret value is not valid UTF-8".into())
    })?;

    let mut fields = FieldMap::new();
    fields.insert(LEGACY_FIELD_NAME.to_string(), Field::sensitive(value));
    Ok(fields)
}
