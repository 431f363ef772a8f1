use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in secretctl.
///
/// Operations return one of these kinds directly — there is no nesting.
/// Decryption failures are normalized to the single opaque
/// `DecryptionFailed` variant so callers never learn which layer
/// rejected the data.
#[derive(Debug, Error)]
pub enum SecretCtlError {
    // --- Input errors ---
    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    #[error("Invalid field name '{0}' — must be snake_case, 1-64 chars")]
    InvalidFieldName(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Value too large: {0}")]
    ValueTooLarge(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    #[error("Invalid environment variable name '{0}'")]
    InvalidEnvVarName(String),

    #[error("Invalid folder: {0}")]
    InvalidFolder(String),

    // --- State errors ---
    #[error("Vault not found at {0}")]
    VaultNotFound(PathBuf),

    #[error("Vault already exists at {0}")]
    VaultAlreadyExists(PathBuf),

    #[error("Vault is locked — unlock it first")]
    VaultLocked,

    #[error("Vault is already unlocked")]
    AlreadyUnlocked,

    #[error("Secret '{0}' not found")]
    SecretNotFound(String),

    #[error("Field '{0}' not found in secret '{1}'")]
    FieldNotFound(String, String),

    // --- Auth errors ---
    #[error("Invalid password")]
    InvalidPassword,

    #[error("Too many failed attempts — retry in {remaining_secs}s")]
    CooldownActive { remaining_secs: u64 },

    // --- Integrity errors ---
    #[error("Vault corrupted: {0}")]
    Corrupted(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("HMAC verification failed — file may be tampered")]
    HmacMismatch,

    #[error("Audit chain broken at sequence {seq}: {reason}")]
    AuditChainBroken { seq: u64, reason: String },

    #[error("Audit error: {0}")]
    AuditError(String),

    // --- Policy errors ---
    #[error("No policy loaded — create mcp-policy.yaml in the vault directory")]
    NoPolicyLoaded,

    #[error("Command denied by policy: {0}")]
    CommandDenied(String),

    #[error("Command not found in trusted directories: {0}")]
    CommandNotFound(String),

    #[error("Command resolves outside trusted directories: {0}")]
    UntrustedCommand(String),

    #[error("Policy file error: {0}")]
    PolicyError(String),

    // --- Runtime errors ---
    #[error("Insufficient disk space: {0}")]
    InsufficientDisk(String),

    #[error("Command timed out after {0}s")]
    CommandTimeout(u64),

    #[error("Too many concurrent run requests — try again shortly")]
    RateLimited,

    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Child process exited with code {0}")]
    ChildProcessFailed(i32),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed — wrong password or corrupted data")]
    DecryptionFailed,

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- IO / serialization / DB ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI ---
    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("User cancelled operation")]
    UserCancelled,
}

impl SecretCtlError {
    /// Map an error to the process exit code contract:
    /// 0 success, 1 generic failure, 2 vault locked or cooldown,
    /// 3 integrity failure, 4 policy denial.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::VaultLocked | Self::CooldownActive { .. } => 2,
            Self::Corrupted(_)
            | Self::InvalidFormat(_)
            | Self::UnsupportedVersion { .. }
            | Self::HmacMismatch
            | Self::AuditChainBroken { .. } => 3,
            Self::NoPolicyLoaded
            | Self::CommandDenied(_)
            | Self::CommandNotFound(_)
            | Self::UntrustedCommand(_) => 4,
            _ => 1,
        }
    }
}

/// Convenience type alias for secretctl results.
pub type Result<T> = std::result::Result<T, SecretCtlError>;
