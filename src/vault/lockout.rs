//! Failed-unlock lockout state machine, persisted at `vault.lock`.
//!
//! Thresholds: 5 failures → 30 s cooldown, 10 → 5 min, 20 → 30 min.
//! The cooldown check happens before any KDF work, so an attacker in
//! cooldown cannot even make the vault burn Argon2 cycles.  The file
//! is deleted on successful unlock.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SecretCtlError};
use crate::vault::fsutil;

/// File name of the persisted lockout state inside the vault dir.
pub const LOCKOUT_FILE: &str = "vault.lock";

/// Cooldown thresholds as (failure count, cooldown seconds), highest
/// first so the first match wins.
const THRESHOLDS: &[(u32, i64)] = &[(20, 30 * 60), (10, 5 * 60), (5, 30)];

/// Persisted lockout state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockoutState {
    /// Consecutive failed unlock attempts.
    pub failed_attempts: u32,

    /// When the last attempt happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// No unlock attempts are processed before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    fn path(vault_dir: &Path) -> PathBuf {
        vault_dir.join(LOCKOUT_FILE)
    }

    /// Load the state from `vault.lock`, or a clean default when the
    /// file is absent.  An unreadable file counts as a clean slate —
    /// the worst case is losing a cooldown, never locking out forever.
    pub fn load(vault_dir: &Path) -> Self {
        let path = Self::path(vault_dir);
        match std::fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Persist the state with 0600 permissions.
    pub fn save(&self, vault_dir: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| SecretCtlError::SerializationError(format!("lockout state: {e}")))?;
        fsutil::write_private_atomic(&Self::path(vault_dir), &bytes)
    }

    /// Remove the persisted state (successful unlock).
    pub fn clear(vault_dir: &Path) -> Result<()> {
        let path = Self::path(vault_dir);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Seconds left in an active cooldown, if any.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> Option<u64> {
        let until = self.cooldown_until?;
        if now < until {
            Some((until - now).num_seconds().max(1) as u64)
        } else {
            None
        }
    }

    /// Reject with `CooldownActive` while a cooldown is running.
    pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
        if let Some(remaining_secs) = self.cooldown_remaining(now) {
            return Err(SecretCtlError::CooldownActive { remaining_secs });
        }
        Ok(())
    }

    /// Record a failed attempt and activate a cooldown when a
    /// threshold is crossed.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.failed_attempts += 1;
        self.last_attempt_at = Some(now);
        if let Some(secs) = cooldown_secs_for(self.failed_attempts) {
            self.cooldown_until = Some(now + Duration::seconds(secs));
        }
    }
}

/// Cooldown duration for a failure count, if a threshold is reached.
fn cooldown_secs_for(failures: u32) -> Option<i64> {
    THRESHOLDS
        .iter()
        .find(|(count, _)| failures >= *count)
        .map(|(_, secs)| *secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn no_cooldown_below_five_failures() {
        let mut state = LockoutState::default();
        let now = Utc::now();
        for _ in 0..4 {
            state.record_failure(now);
        }
        assert_eq!(state.failed_attempts, 4);
        assert!(state.cooldown_until.is_none());
        assert!(state.check(now).is_ok());
    }

    #[test]
    fn fifth_failure_starts_30s_cooldown() {
        let mut state = LockoutState::default();
        let now = Utc::now();
        for _ in 0..5 {
            state.record_failure(now);
        }
        let remaining = state.cooldown_remaining(now).unwrap();
        assert!(remaining <= 30 && remaining >= 28, "remaining={remaining}");
        assert!(matches!(
            state.check(now),
            Err(SecretCtlError::CooldownActive { .. })
        ));
    }

    #[test]
    fn tenth_failure_escalates_to_5_minutes() {
        let mut state = LockoutState::default();
        let now = Utc::now();
        for _ in 0..10 {
            state.record_failure(now);
        }
        let remaining = state.cooldown_remaining(now).unwrap();
        assert!(remaining > 4 * 60, "remaining={remaining}");
        assert!(remaining <= 5 * 60);
    }

    #[test]
    fn twentieth_failure_escalates_to_30_minutes() {
        let mut state = LockoutState::default();
        let now = Utc::now();
        for _ in 0..20 {
            state.record_failure(now);
        }
        let remaining = state.cooldown_remaining(now).unwrap();
        assert!(remaining > 29 * 60, "remaining={remaining}");
        assert!(remaining <= 30 * 60);
    }

    #[test]
    fn cooldown_expires() {
        let mut state = LockoutState::default();
        let start = Utc::now();
        for _ in 0..5 {
            state.record_failure(start);
        }
        let later = start + Duration::seconds(31);
        assert!(state.check(later).is_ok());
    }

    #[test]
    fn save_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let mut state = LockoutState::default();
        let now = Utc::now();
        for _ in 0..6 {
            state.record_failure(now);
        }
        state.save(tmp.path()).unwrap();

        let loaded = LockoutState::load(tmp.path());
        assert_eq!(loaded.failed_attempts, 6);
        assert!(loaded.cooldown_until.is_some());
    }

    #[test]
    fn load_missing_file_is_clean() {
        let tmp = TempDir::new().unwrap();
        let state = LockoutState::load(tmp.path());
        assert_eq!(state.failed_attempts, 0);
        assert!(state.cooldown_until.is_none());
    }

    #[test]
    fn clear_removes_file() {
        let tmp = TempDir::new().unwrap();
        let state = LockoutState {
            failed_attempts: 3,
            ..Default::default()
        };
        state.save(tmp.path()).unwrap();
        assert!(tmp.path().join(LOCKOUT_FILE).exists());

        LockoutState::clear(tmp.path()).unwrap();
        assert!(!tmp.path().join(LOCKOUT_FILE).exists());
    }

    #[test]
    fn corrupt_file_loads_as_clean() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(LOCKOUT_FILE), b"not json").unwrap();
        let state = LockoutState::load(tmp.path());
        assert_eq!(state.failed_attempts, 0);
    }
}
