//! The multi-field secret model: fields with aliases and sensitivity
//! flags, env-var bindings, metadata, tags, and the validation rules
//! shared by the vault store and the agent tool server.

pub mod entry;
pub mod field;

pub use entry::{
    validate_env_var_name, validate_key, Metadata, SecretEntry, SecretInfo, BLOCKED_ENV_VARS,
};
pub use field::{
    convert_legacy_value, resolve_field_name, validate_fields, Field, FieldMap,
};
