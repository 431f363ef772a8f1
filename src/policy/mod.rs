//! Command execution policy for the agent tool server.
//!
//! The policy document (`mcp-policy.yaml` in the vault directory) is
//! declarative: a default action, deny and allow lists, and per-label
//! environment alias rules.  Loading is TOCTOU-safe: the file is opened
//! with O_NOFOLLOW and all checks (regular file, owned by the current
//! user, mode 0600) run against the open file descriptor, never a
//! second path lookup.
//!
//! Decision order for a command:
//! 1. the hardcoded deny-list (not overridable),
//! 2. user `denied_commands`,
//! 3. user `allowed_commands`,
//! 4. `default_action`.
//!
//! Binaries resolve against a fixed trusted-directory list — never the
//! ambient PATH — and must still be inside a trusted directory after
//! symlink resolution.  The decision is evaluated against both the
//! original command string and the resolved path; denial wins.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SecretCtlError};

/// Policy file name inside the vault directory.
pub const POLICY_FILE: &str = "mcp-policy.yaml";

/// Commands rejected regardless of user policy: each one can dump the
/// child environment.
pub const HARDCODED_DENY: &[&str] = &["env", "printenv", "set", "export", "cat /proc/*/environ"];

/// The only directories a command may resolve into.
pub const TRUSTED_DIRS: &[&str] = &[
    "/usr/bin",
    "/bin",
    "/usr/sbin",
    "/sbin",
    "/usr/local/bin",
    "/opt/homebrew/bin",
];

/// Fallback when no list matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultAction {
    Allow,
    #[default]
    Deny,
}

/// One alias-expansion rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasRule {
    pub pattern: String,
    pub target: String,
}

/// The parsed policy document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub version: u32,

    #[serde(default)]
    pub default_action: DefaultAction,

    #[serde(default)]
    pub denied_commands: Vec<String>,

    #[serde(default)]
    pub allowed_commands: Vec<String>,

    #[serde(default)]
    pub env_aliases: BTreeMap<String, Vec<AliasRule>>,
}

impl Policy {
    /// Load and validate `mcp-policy.yaml` from the vault directory.
    pub fn load(vault_dir: &Path) -> Result<Self> {
        let path = vault_dir.join(POLICY_FILE);
        if !path.exists() {
            return Err(SecretCtlError::NoPolicyLoaded);
        }

        let mut file = open_no_follow(&path)?;
        check_fd_safety(&file, &path)?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let policy: Policy = serde_yaml::from_str(&contents)
            .map_err(|e| SecretCtlError::PolicyError(format!("invalid policy YAML: {e}")))?;

        if policy.version != 1 {
            return Err(SecretCtlError::PolicyError(format!(
                "unsupported policy version {}",
                policy.version
            )));
        }

        Ok(policy)
    }

    /// Evaluate the decision order against the original command string,
    /// the full command line (command plus arguments), and the resolved
    /// binary path.  Denial wins over every allow.
    pub fn is_command_allowed(
        &self,
        command: &str,
        full_line: &str,
        resolved: &Path,
    ) -> Result<()> {
        // 1. Hardcoded deny-list.  Whitespace entries are matched as
        //    glob patterns over the full line so argument variations
        //    (`cat /proc/123/environ`) cannot slip through.
        for pattern in HARDCODED_DENY {
            let denied = if pattern.contains(char::is_whitespace) {
                *pattern == full_line
                    || *pattern == command
                    || glob::Pattern::new(pattern)
                        .map(|p| p.matches(full_line))
                        .unwrap_or(false)
            } else {
                matches_pattern(pattern, command, full_line, resolved)
            };
            if denied {
                return Err(SecretCtlError::CommandDenied(format!(
                    "'{command}' is on the built-in deny list"
                )));
            }
        }

        // 2. User deny list.
        for pattern in &self.denied_commands {
            if matches_pattern(pattern, command, full_line, resolved) {
                return Err(SecretCtlError::CommandDenied(format!(
                    "'{command}' matches denied pattern '{pattern}'"
                )));
            }
        }

        // 3. User allow list.
        for pattern in &self.allowed_commands {
            if matches_pattern(pattern, command, full_line, resolved) {
                return Ok(());
            }
        }

        // 4. Fallback.
        match self.default_action {
            DefaultAction::Allow => Ok(()),
            DefaultAction::Deny => Err(SecretCtlError::CommandDenied(format!(
                "'{command}' is not on the allow list (default action is deny)"
            ))),
        }
    }

    /// Apply the alias rules of one environment label to a key list.
    ///
    /// The first matching rule wins; a trailing `*` in the pattern
    /// captures the suffix and substitutes it into the trailing `*` of
    /// the target.  Non-matching keys pass through unchanged.  An
    /// unknown label is an error.
    pub fn expand_aliases(&self, env: &str, keys: &[String]) -> Result<Vec<String>> {
        let rules = self.env_aliases.get(env).ok_or_else(|| {
            SecretCtlError::PolicyError(format!("unknown environment alias '{env}'"))
        })?;

        let mut expanded = Vec::with_capacity(keys.len());
        for key in keys {
            let mut result = key.clone();
            for rule in rules {
                if let Some(prefix) = rule.pattern.strip_suffix('*') {
                    if let Some(suffix) = key.strip_prefix(prefix) {
                        result = if let Some(target_prefix) = rule.target.strip_suffix('*') {
                            format!("{target_prefix}{suffix}")
                        } else {
                            rule.target.clone()
                        };
                        break;
                    }
                } else if rule.pattern == *key {
                    result = rule.target.clone();
                    break;
                }
            }
            expanded.push(result);
        }
        Ok(expanded)
    }
}

/// Resolve a command to a real binary path.
///
/// Absolute commands are taken as given; anything else is searched in
/// the fixed trusted-directory list, in order.  The resolved file must
/// exist, be regular, carry an execute bit, and — after symlink
/// resolution — still live inside a trusted directory.
pub fn resolve_binary(command: &str) -> Result<PathBuf> {
    let candidate = if Path::new(command).is_absolute() {
        PathBuf::from(command)
    } else {
        TRUSTED_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(command))
            .find(|p| p.exists())
            .ok_or_else(|| SecretCtlError::CommandNotFound(command.to_string()))?
    };

    let metadata = std::fs::symlink_metadata(&candidate)
        .map_err(|_| SecretCtlError::CommandNotFound(command.to_string()))?;
    let resolved = candidate
        .canonicalize()
        .map_err(|_| SecretCtlError::CommandNotFound(command.to_string()))?;
    let real_meta = std::fs::metadata(&resolved)
        .map_err(|_| SecretCtlError::CommandNotFound(command.to_string()))?;

    if !metadata.is_file() && !metadata.is_symlink() || !real_meta.is_file() {
        return Err(SecretCtlError::CommandNotFound(format!(
            "{command} is not a regular file"
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if real_meta.permissions().mode() & 0o111 == 0 {
            return Err(SecretCtlError::CommandNotFound(format!(
                "{command} is not executable"
            )));
        }
    }

    if !in_trusted_dir(&resolved) {
        return Err(SecretCtlError::UntrustedCommand(
            resolved.display().to_string(),
        ));
    }

    Ok(resolved)
}

/// True when `path` (already canonical) sits directly inside one of
/// the trusted directories.
fn in_trusted_dir(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    TRUSTED_DIRS.iter().any(|dir| {
        // Trusted dirs may themselves be symlinks (e.g. /bin → /usr/bin).
        let trusted = Path::new(dir);
        parent == trusted
            || trusted
                .canonicalize()
                .map(|t| parent == t)
                .unwrap_or(false)
    })
}

/// Pattern matching rule:
/// - absolute pattern → canonicalized absolute-path equality,
/// - pattern with whitespace → exact string equality,
/// - otherwise → basename equality (against both the command string
///   and the resolved path).
fn matches_pattern(pattern: &str, command: &str, full_line: &str, resolved: &Path) -> bool {
    if Path::new(pattern).is_absolute() {
        let pattern_path = Path::new(pattern)
            .canonicalize()
            .unwrap_or_else(|_| PathBuf::from(pattern));
        return pattern_path == resolved
            || (Path::new(command).is_absolute() && Path::new(pattern) == Path::new(command));
    }

    if pattern.contains(char::is_whitespace) {
        return pattern == full_line || pattern == command;
    }

    let command_base = Path::new(command)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| command.to_string());
    let resolved_base = resolved
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    pattern == command_base || pattern == resolved_base
}

/// Open a path refusing to traverse a final symlink.
fn open_no_follow(path: &Path) -> Result<File> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NOFOLLOW)
            .open(path)
            .map_err(|e| {
                if e.raw_os_error() == Some(libc::ELOOP) {
                    SecretCtlError::PolicyError(format!(
                        "{} is a symlink — the policy file must be a regular file",
                        path.display()
                    ))
                } else {
                    SecretCtlError::Io(e)
                }
            })
    }
    #[cfg(not(unix))]
    {
        std::fs::File::open(path).map_err(SecretCtlError::Io)
    }
}

/// Ownership and permission checks against the open descriptor.
fn check_fd_safety(file: &File, path: &Path) -> Result<()> {
    let metadata = file.metadata()?;

    if !metadata.is_file() {
        return Err(SecretCtlError::PolicyError(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        use std::os::unix::fs::PermissionsExt;

        let euid = unsafe { libc::geteuid() };
        if metadata.uid() != euid {
            return Err(SecretCtlError::PolicyError(format!(
                "{} is not owned by the current user",
                path.display()
            )));
        }

        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            return Err(SecretCtlError::PolicyError(format!(
                "{} has mode {mode:03o}, expected 600",
                path.display()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_policy(dir: &Path, contents: &str) {
        let path = dir.join(POLICY_FILE);
        std::fs::write(&path, contents).unwrap();
        crate::vault::fsutil::set_mode(&path, 0o600).unwrap();
    }

    fn allow_all() -> Policy {
        Policy {
            version: 1,
            default_action: DefaultAction::Allow,
            denied_commands: Vec::new(),
            allowed_commands: Vec::new(),
            env_aliases: BTreeMap::new(),
        }
    }

    #[test]
    fn load_valid_policy() {
        let tmp = TempDir::new().unwrap();
        write_policy(
            tmp.path(),
            "version: 1\n\
             default_action: deny\n\
             allowed_commands:\n  - echo\n  - /usr/bin/git\n\
             denied_commands:\n  - curl\n",
        );

        let policy = Policy::load(tmp.path()).unwrap();
        assert_eq!(policy.default_action, DefaultAction::Deny);
        assert_eq!(policy.allowed_commands, vec!["echo", "/usr/bin/git"]);
    }

    #[test]
    fn missing_policy_is_no_policy_loaded() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            Policy::load(tmp.path()),
            Err(SecretCtlError::NoPolicyLoaded)
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let tmp = TempDir::new().unwrap();
        write_policy(tmp.path(), "version: 2\n");
        assert!(matches!(
            Policy::load(tmp.path()),
            Err(SecretCtlError::PolicyError(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn loose_permissions_are_rejected() {
        let tmp = TempDir::new().unwrap();
        write_policy(tmp.path(), "version: 1\n");
        crate::vault::fsutil::set_mode(&tmp.path().join(POLICY_FILE), 0o644).unwrap();
        assert!(matches!(
            Policy::load(tmp.path()),
            Err(SecretCtlError::PolicyError(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_policy_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let real = tmp.path().join("real.yaml");
        std::fs::write(&real, "version: 1\n").unwrap();
        crate::vault::fsutil::set_mode(&real, 0o600).unwrap();
        std::os::unix::fs::symlink(&real, tmp.path().join(POLICY_FILE)).unwrap();

        assert!(matches!(
            Policy::load(tmp.path()),
            Err(SecretCtlError::PolicyError(_))
        ));
    }

    #[test]
    fn hardcoded_deny_beats_allow_all() {
        let policy = allow_all();
        let resolved = PathBuf::from("/usr/bin/env");
        for cmd in ["env", "printenv", "set", "export"] {
            assert!(
                policy.is_command_allowed(cmd, cmd, &resolved).is_err(),
                "{cmd} must always be denied"
            );
        }
        assert!(policy
            .is_command_allowed("cat /proc/*/environ", "cat /proc/*/environ", &resolved)
            .is_err());
    }

    #[test]
    fn hardcoded_deny_beats_explicit_allowlist() {
        let mut policy = allow_all();
        policy.allowed_commands = vec!["env".to_string()];
        let resolved = PathBuf::from("/usr/bin/env");
        assert!(policy.is_command_allowed("env", "env", &resolved).is_err());
    }

    #[test]
    fn proc_environ_glob_catches_real_pids() {
        let policy = allow_all();
        let resolved = PathBuf::from("/bin/cat");
        assert!(policy
            .is_command_allowed("cat", "cat /proc/1234/environ", &resolved)
            .is_err());
        // Plain cat is not denied by the whitespace pattern.
        assert!(policy
            .is_command_allowed("cat", "cat file.txt", &resolved)
            .is_ok());
    }

    #[test]
    fn user_deny_wins_over_allow() {
        let mut policy = allow_all();
        policy.denied_commands = vec!["curl".to_string()];
        policy.allowed_commands = vec!["curl".to_string()];
        let resolved = PathBuf::from("/usr/bin/curl");
        assert!(policy.is_command_allowed("curl", "curl", &resolved).is_err());
    }

    #[test]
    fn default_deny_blocks_unlisted() {
        let mut policy = allow_all();
        policy.default_action = DefaultAction::Deny;
        policy.allowed_commands = vec!["echo".to_string()];
        let echo = PathBuf::from("/bin/echo");
        let ls = PathBuf::from("/bin/ls");

        assert!(policy.is_command_allowed("echo", "echo hi", &echo).is_ok());
        assert!(policy.is_command_allowed("ls", "ls", &ls).is_err());
    }

    #[test]
    fn basename_pattern_matches_resolved_path() {
        let mut policy = allow_all();
        policy.default_action = DefaultAction::Deny;
        policy.allowed_commands = vec!["echo".to_string()];
        let resolved = PathBuf::from("/usr/bin/echo");
        assert!(policy
            .is_command_allowed("/usr/bin/echo", "/usr/bin/echo hi", &resolved)
            .is_ok());
    }

    #[test]
    fn whitespace_pattern_requires_exact_match() {
        let mut policy = allow_all();
        policy.denied_commands = vec!["git push".to_string()];
        let resolved = PathBuf::from("/usr/bin/git");

        assert!(policy
            .is_command_allowed("git", "git push", &resolved)
            .is_err());
        // The deny pattern must not leak onto bare `git`.
        assert!(policy.is_command_allowed("git", "git status", &resolved).is_ok());
    }

    #[test]
    fn resolve_finds_trusted_binary() {
        // `sh` exists in /bin or /usr/bin on any Unix test machine.
        let resolved = resolve_binary("sh").unwrap();
        assert!(in_trusted_dir(&resolved), "{}", resolved.display());
    }

    #[test]
    fn resolve_rejects_unknown_command() {
        assert!(matches!(
            resolve_binary("definitely-not-a-real-binary-xyz"),
            Err(SecretCtlError::CommandNotFound(_))
        ));
    }

    #[test]
    fn resolve_rejects_untrusted_absolute_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("evil");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        crate::vault::fsutil::set_mode(&path, 0o755).unwrap();

        assert!(matches!(
            resolve_binary(path.to_str().unwrap()),
            Err(SecretCtlError::UntrustedCommand(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escaping_trusted_dirs() {
        // A symlink inside a trusted dir pointing outside cannot be
        // planted in a test, so emulate the other direction: a symlink
        // outside pointing at a trusted binary is itself untrusted
        // as an absolute command only if the target dir is untrusted —
        // pointing INTO a trusted dir is fine.  Here: symlink to a
        // script in /tmp must be rejected.
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("script");
        std::fs::write(&target, b"#!/bin/sh\n").unwrap();
        crate::vault::fsutil::set_mode(&target, 0o755).unwrap();
        let link = tmp.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        assert!(matches!(
            resolve_binary(link.to_str().unwrap()),
            Err(SecretCtlError::UntrustedCommand(_))
        ));
    }

    #[test]
    fn alias_expansion_with_capture() {
        let mut policy = allow_all();
        policy.env_aliases.insert(
            "prod".to_string(),
            vec![
                AliasRule {
                    pattern: "db/*".to_string(),
                    target: "prod/db/*".to_string(),
                },
                AliasRule {
                    pattern: "api_key".to_string(),
                    target: "prod/api_key".to_string(),
                },
            ],
        );

        let keys = vec![
            "db/password".to_string(),
            "api_key".to_string(),
            "untouched".to_string(),
        ];
        let expanded = policy.expand_aliases("prod", &keys).unwrap();
        assert_eq!(expanded, vec!["prod/db/password", "prod/api_key", "untouched"]);
    }

    #[test]
    fn alias_first_match_wins() {
        let mut policy = allow_all();
        policy.env_aliases.insert(
            "stage".to_string(),
            vec![
                AliasRule {
                    pattern: "a*".to_string(),
                    target: "first/*".to_string(),
                },
                AliasRule {
                    pattern: "ab*".to_string(),
                    target: "second/*".to_string(),
                },
            ],
        );
        let expanded = policy
            .expand_aliases("stage", &["abc".to_string()])
            .unwrap();
        assert_eq!(expanded, vec!["first/bc"]);
    }

    #[test]
    fn unknown_alias_label_is_error() {
        let policy = allow_all();
        assert!(matches!(
            policy.expand_aliases("nope", &["k".to_string()]),
            Err(SecretCtlError::PolicyError(_))
        ));
    }
}
