//! Filesystem discipline for the vault directory: permission modes,
//! atomic writes, and disk-space checks.
//!
//! The vault directory is 0700 and every file inside it is 0600.
//! Writes refuse to proceed when free space drops below
//! max(10 MiB, 2 × payload), and a warning is raised when the
//! filesystem is more than 90% full.

use std::fs;
use std::path::Path;

use crate::errors::{Result, SecretCtlError};

/// Required mode for the vault directory.
pub const DIR_MODE: u32 = 0o700;

/// Required mode for every vault file.
pub const FILE_MODE: u32 = 0o600;

/// Absolute free-space floor for any write (10 MiB).
const MIN_FREE_BYTES: u64 = 10 * 1024 * 1024;

/// Fraction of the filesystem that may be used before warning.
const FULL_WARN_RATIO: f64 = 0.90;

/// Create a directory with mode 0700 (parents included).
pub fn create_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    set_mode(path, DIR_MODE)
}

/// Write a file atomically (temp file + rename) with mode 0600.
pub fn write_private_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    let tmp_path = parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ));

    fs::write(&tmp_path, contents)?;
    set_mode(&tmp_path, FILE_MODE)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Set permission bits on a path (no-op on non-Unix).
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Return the permission bits of a path, or `None` off-Unix.
pub fn mode_of(path: &Path) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}

/// Compare a path's permission bits against the required mode and
/// return a human-readable warning when they differ.
pub fn permission_warning(path: &Path, required: u32) -> Option<String> {
    let actual = mode_of(path)?;
    if actual != required {
        Some(format!(
            "{} has mode {actual:03o}, expected {required:03o}",
            path.display()
        ))
    } else {
        None
    }
}

/// Free and total bytes of the filesystem containing `path`.
#[cfg(unix)]
pub fn disk_usage(path: &Path) -> Result<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| SecretCtlError::CommandFailed("path contains NUL byte".into()))?;

    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(SecretCtlError::Io(std::io::Error::last_os_error()));
    }

    let frsize = stat.f_frsize as u64;
    let free = stat.f_bavail as u64 * frsize;
    let total = stat.f_blocks as u64 * frsize;
    Ok((free, total))
}

#[cfg(not(unix))]
pub fn disk_usage(_path: &Path) -> Result<(u64, u64)> {
    // No portable statvfs equivalent; report plenty of space.
    Ok((u64::MAX, u64::MAX))
}

/// Refuse a write when free space is below max(10 MiB, 2 × payload).
/// Returns a warning string when the filesystem is over 90% full.
pub fn check_disk_space(dir: &Path, payload_len: u64) -> Result<Option<String>> {
    let (free, total) = disk_usage(dir)?;

    let required = MIN_FREE_BYTES.max(payload_len.saturating_mul(2));
    if free < required {
        return Err(SecretCtlError::InsufficientDisk(format!(
            "{free} bytes free, {required} required"
        )));
    }

    if total > 0 {
        let used_ratio = 1.0 - (free as f64 / total as f64);
        if used_ratio > FULL_WARN_RATIO {
            return Ok(Some(format!(
                "filesystem is {:.0}% full",
                used_ratio * 100.0
            )));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn private_dir_has_0700() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("vault");
        create_private_dir(&dir).unwrap();
        assert_eq!(mode_of(&dir), Some(0o700));
    }

    #[test]
    fn atomic_write_has_0600() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("vault.meta");
        write_private_atomic(&path, b"{}").unwrap();
        assert_eq!(mode_of(&path), Some(0o600));
        assert_eq!(fs::read(&path).unwrap(), b"{}");
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        write_private_atomic(&path, b"old").unwrap();
        write_private_atomic(&path, b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn permission_warning_fires_on_loose_mode() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, b"x").unwrap();
        set_mode(&path, 0o644).unwrap();

        let warning = permission_warning(&path, FILE_MODE);
        assert!(warning.is_some());
        assert!(warning.unwrap().contains("644"));
    }

    #[test]
    fn permission_warning_silent_on_correct_mode() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("f");
        fs::write(&path, b"x").unwrap();
        set_mode(&path, FILE_MODE).unwrap();
        assert!(permission_warning(&path, FILE_MODE).is_none());
    }

    #[test]
    fn disk_usage_reports_nonzero_total() {
        let tmp = TempDir::new().unwrap();
        let (free, total) = disk_usage(tmp.path()).unwrap();
        assert!(total > 0);
        assert!(free <= total);
    }

    #[test]
    fn check_disk_space_passes_small_payload() {
        let tmp = TempDir::new().unwrap();
        // A tiny payload on any sane test machine should pass.
        assert!(check_disk_space(tmp.path(), 1024).is_ok());
    }

    #[test]
    fn check_disk_space_rejects_absurd_payload() {
        let tmp = TempDir::new().unwrap();
        let result = check_disk_space(tmp.path(), u64::MAX / 4);
        assert!(matches!(
            result,
            Err(SecretCtlError::InsufficientDisk(_))
        ));
    }
}
