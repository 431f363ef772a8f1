//! Child-process execution for the agent `run` tools.
//!
//! The child gets a hand-constructed minimal environment: a small
//! whitelist inherited from the parent plus the injected secrets, and
//! nothing else.  The executable is invoked directly with its argv
//! vector — no shell is involved.  Output capture is bounded at
//! 10 MiB per stream and every secret-bearing buffer is wiped after
//! `wait`.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use zeroize::{Zeroize, Zeroizing};

use crate::errors::{Result, SecretCtlError};
use crate::model::{validate_env_var_name, BLOCKED_ENV_VARS};

/// Concurrency cap for `run`/`run_with_bindings`.
pub const MAX_CONCURRENT_RUNS: u32 = 5;

/// Maximum number of keys in one request.
pub const MAX_KEYS: usize = 10;

/// Maximum command length in bytes.
const MAX_COMMAND_LEN: usize = 4096;

/// Maximum number of arguments.
const MAX_ARGS: usize = 100;

/// Maximum length of a single argument in bytes (32 KiB).
const MAX_ARG_LEN: usize = 32 * 1024;

/// Per-stream capture cap (10 MiB).
const MAX_CAPTURE: usize = 10 * 1024 * 1024;

/// Default execution deadline.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5 * 60;

/// Hard cap on the execution deadline (1 hour).
pub const MAX_TIMEOUT_SECS: u64 = 60 * 60;

/// Parent variables the child is allowed to inherit.
const INHERITED_ENV: &[&str] = &[
    "PATH", "HOME", "USER", "LOGNAME", "LANG", "LC_ALL", "TERM", "TZ",
];

/// Counting semaphore bounding concurrent runs.  `try_acquire` never
/// blocks — a full semaphore is a `RateLimited` rejection.
pub struct RunLimiter {
    available: Mutex<u32>,
    released: Condvar,
}

impl RunLimiter {
    pub fn new(width: u32) -> Self {
        Self {
            available: Mutex::new(width),
            released: Condvar::new(),
        }
    }

    /// Take a slot, or fail immediately when all slots are busy.
    pub fn try_acquire(&self) -> Result<RunPermit<'_>> {
        let mut available = self
            .available
            .lock()
            .map_err(|_| SecretCtlError::CommandFailed("run limiter poisoned".into()))?;
        if *available == 0 {
            return Err(SecretCtlError::RateLimited);
        }
        *available -= 1;
        Ok(RunPermit { limiter: self })
    }
}

impl Default for RunLimiter {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT_RUNS)
    }
}

/// RAII slot handle; releases on drop.
pub struct RunPermit<'a> {
    limiter: &'a RunLimiter,
}

impl Drop for RunPermit<'_> {
    fn drop(&mut self) {
        if let Ok(mut available) = self.limiter.available.lock() {
            *available += 1;
            self.limiter.released.notify_one();
        }
    }
}

/// Validate the command string, argument vector, and key count.
pub fn validate_run_input(command: &str, args: &[String], key_count: usize) -> Result<()> {
    if key_count > MAX_KEYS {
        return Err(SecretCtlError::InvalidField(format!(
            "at most {MAX_KEYS} keys per run (got {key_count})"
        )));
    }
    if command.is_empty() {
        return Err(SecretCtlError::ExecutionFailed("empty command".into()));
    }
    if command.len() > MAX_COMMAND_LEN {
        return Err(SecretCtlError::ValueTooLarge(format!(
            "command exceeds {MAX_COMMAND_LEN} bytes"
        )));
    }
    if command.contains('\0') || command.contains("..") || command.contains("/./") {
        return Err(SecretCtlError::ExecutionFailed(
            "command contains forbidden path sequence".into(),
        ));
    }
    if args.len() > MAX_ARGS {
        return Err(SecretCtlError::ValueTooLarge(format!(
            "too many arguments: {} (max {MAX_ARGS})",
            args.len()
        )));
    }
    for arg in args {
        if arg.len() > MAX_ARG_LEN {
            return Err(SecretCtlError::ValueTooLarge(format!(
                "argument exceeds {MAX_ARG_LEN} bytes"
            )));
        }
        if arg.contains('\0') {
            return Err(SecretCtlError::ExecutionFailed(
                "argument contains NUL byte".into(),
            ));
        }
    }
    Ok(())
}

/// Build the child environment: the inherited whitelist (minus any
/// blocked names) plus the validated injected variables.
pub fn build_environment(
    injected: &[(String, Zeroizing<String>)],
) -> Result<Vec<(String, Zeroizing<String>)>> {
    let mut env: Vec<(String, Zeroizing<String>)> = Vec::new();

    for name in INHERITED_ENV {
        let upper = name.to_uppercase();
        if BLOCKED_ENV_VARS.iter().any(|blocked| *blocked == upper) {
            continue;
        }
        if let Ok(value) = std::env::var(name) {
            env.push((name.to_string(), Zeroizing::new(value)));
        }
    }

    for (name, value) in injected {
        validate_env_var_name(name)?;
        if name.contains('\0') || value.contains('\0') {
            return Err(SecretCtlError::ExecutionFailed(
                "environment entry contains NUL byte".into(),
            ));
        }
        // Injected values shadow inherited ones.
        env.retain(|(existing, _)| existing != name);
        env.push((name.clone(), value.clone()));
    }

    Ok(env)
}

/// Raw (unsanitized) output of a finished child.
pub struct RawRunOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub duration: Duration,
}

impl RawRunOutput {
    /// Wipe the captured bytes in place.
    pub fn wipe(&mut self) {
        self.stdout.zeroize();
        self.stderr.zeroize();
    }
}

/// Spawn the resolved binary directly (no shell) with the given
/// environment, enforce the deadline, and capture both streams
/// truncated at 10 MiB each.
///
/// A deadline breach kills the child and returns `CommandTimeout` —
/// never a fabricated zero exit.
pub fn execute(
    resolved: &Path,
    args: &[String],
    env: &[(String, Zeroizing<String>)],
    timeout: Duration,
) -> Result<RawRunOutput> {
    let started = Instant::now();

    let mut command = Command::new(resolved);
    command
        .args(args)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (name, value) in env {
        command.env(name, value.as_str());
    }

    let mut child = command
        .spawn()
        .map_err(|e| SecretCtlError::ExecutionFailed(format!("spawn failed: {e}")))?;

    // Drain both pipes on their own threads so a chatty child cannot
    // deadlock against a full pipe buffer.
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();
    let stdout_handle = std::thread::spawn(move || read_capped(stdout_pipe));
    let stderr_handle = std::thread::spawn(move || read_capped(stderr_pipe));

    // Poll for exit until the deadline.
    let exit_status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() >= timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Collect and wipe whatever was captured so far.
                    let mut stdout = stdout_handle.join().unwrap_or_default();
                    let mut stderr = stderr_handle.join().unwrap_or_default();
                    stdout.zeroize();
                    stderr.zeroize();
                    return Err(SecretCtlError::CommandTimeout(timeout.as_secs()));
                }
                std::thread::sleep(Duration::from_millis(25));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(SecretCtlError::ExecutionFailed(format!("wait failed: {e}")));
            }
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(RawRunOutput {
        exit_code: exit_status.code().unwrap_or(-1),
        stdout,
        stderr,
        duration: started.elapsed(),
    })
}

/// Read a pipe to EOF, keeping at most `MAX_CAPTURE` bytes.
fn read_capped<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let Some(mut pipe) = pipe else {
        return Vec::new();
    };
    let mut captured = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match pipe.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if captured.len() < MAX_CAPTURE {
                    let take = n.min(MAX_CAPTURE - captured.len());
                    captured.extend_from_slice(&buf[..take]);
                }
                // Past the cap we keep draining so the child never
                // blocks, but discard the bytes.
            }
            Err(_) => break,
        }
    }
    captured
}

/// Clamp a requested timeout to the default / maximum.
pub fn effective_timeout(requested_secs: Option<u64>) -> Duration {
    let secs = requested_secs
        .unwrap_or(DEFAULT_TIMEOUT_SECS)
        .min(MAX_TIMEOUT_SECS)
        .max(1);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_rejects_sixth_concurrent_run() {
        let limiter = RunLimiter::default();
        let permits: Vec<_> = (0..5).map(|_| limiter.try_acquire().unwrap()).collect();
        assert!(matches!(
            limiter.try_acquire(),
            Err(SecretCtlError::RateLimited)
        ));
        drop(permits);
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn input_limits_are_enforced() {
        assert!(validate_run_input("echo", &[], 0).is_ok());
        assert!(validate_run_input("echo", &[], 11).is_err());
        assert!(validate_run_input("", &[], 0).is_err());
        assert!(validate_run_input(&"x".repeat(4097), &[], 0).is_err());
        assert!(validate_run_input("a/../b", &[], 0).is_err());
        assert!(validate_run_input("a/./b", &[], 0).is_err());
        assert!(validate_run_input("echo\0", &[], 0).is_err());

        let many_args: Vec<String> = (0..101).map(|i| i.to_string()).collect();
        assert!(validate_run_input("echo", &many_args, 0).is_err());
        assert!(validate_run_input("echo", &["x".repeat(32 * 1024 + 1)], 0).is_err());
        assert!(validate_run_input("echo", &["nul\0arg".to_string()], 0).is_err());
    }

    #[test]
    fn environment_is_minimal_whitelist() {
        let env = build_environment(&[]).unwrap();
        for (name, _) in &env {
            assert!(INHERITED_ENV.contains(&name.as_str()), "leaked: {name}");
        }
    }

    #[test]
    fn injected_vars_are_validated() {
        let ok = vec![("MY_TOKEN".to_string(), Zeroizing::new("v".to_string()))];
        assert!(build_environment(&ok).is_ok());

        let blocked = vec![("LD_PRELOAD".to_string(), Zeroizing::new("v".to_string()))];
        assert!(build_environment(&blocked).is_err());

        let bad_name = vec![("1BAD".to_string(), Zeroizing::new("v".to_string()))];
        assert!(build_environment(&bad_name).is_err());

        let nul_value = vec![("OK".to_string(), Zeroizing::new("a\0b".to_string()))];
        assert!(build_environment(&nul_value).is_err());
    }

    #[test]
    fn injected_shadows_inherited() {
        std::env::set_var("TZ", "UTC");
        let injected = vec![("TZ".to_string(), Zeroizing::new("custom".to_string()))];
        let env = build_environment(&injected).unwrap();
        let tz: Vec<_> = env.iter().filter(|(n, _)| n == "TZ").collect();
        assert_eq!(tz.len(), 1);
        assert_eq!(tz[0].1.as_str(), "custom");
    }

    #[cfg(unix)]
    #[test]
    fn execute_captures_output_and_exit_code() {
        let sh = crate::policy::resolve_binary("sh").unwrap();
        let output = execute(
            &sh,
            &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
            &build_environment(&[]).unwrap(),
            Duration::from_secs(10),
        )
        .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout, b"out\n");
        assert_eq!(output.stderr, b"err\n");
    }

    #[cfg(unix)]
    #[test]
    fn deadline_breach_is_an_error() {
        let sh = crate::policy::resolve_binary("sh").unwrap();
        let result = execute(
            &sh,
            &["-c".to_string(), "sleep 30".to_string()],
            &[],
            Duration::from_millis(200),
        );
        assert!(matches!(result, Err(SecretCtlError::CommandTimeout(_))));
    }

    #[cfg(unix)]
    #[test]
    fn child_env_contains_only_construction() {
        let sh = crate::policy::resolve_binary("sh").unwrap();
        let injected = vec![("INJECTED".to_string(), Zeroizing::new("yes".to_string()))];
        let env = build_environment(&injected).unwrap();
        let output = execute(
            &sh,
            &["-c".to_string(), "printf '%s' \"$INJECTED\"".to_string()],
            &env,
            Duration::from_secs(10),
        )
        .unwrap();
        assert_eq!(output.stdout, b"yes");
    }

    #[test]
    fn timeout_clamping() {
        assert_eq!(effective_timeout(None), Duration::from_secs(300));
        assert_eq!(effective_timeout(Some(10)), Duration::from_secs(10));
        assert_eq!(effective_timeout(Some(999_999)), Duration::from_secs(3600));
        assert_eq!(effective_timeout(Some(0)), Duration::from_secs(1));
    }
}
