//! Stat-tuple replay on restored files.
//!
//! Ownership goes first, then mode, then times; the immutable-style flag
//! classes that would make the time reset fail are not modelled on Unix
//! targets. Symlinks get `lchown` and symlink times and are never chmod-ed
//! (that would touch the target). Permission errors for non-root users are
//! demoted to debug noise, as unprivileged restores cannot chown.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use filetime::FileTime;
use flist::{FileType, UnixStat};
use tracing::{debug, error};

fn running_as_root() -> bool {
    rustix::process::geteuid().is_root()
}

fn count_error(errors: &mut u32, demoted: bool, what: &str, path: &Path, err: &std::io::Error) {
    if demoted {
        debug!(path = %path.display(), %err, "cannot {what} (unprivileged)");
    } else {
        error!(path = %path.display(), %err, "unable to {what}");
        *errors += 1;
    }
}

/// Replays owner, mode, and times onto a restored file.
///
/// Returns the number of errors worth reporting; permission failures of
/// unprivileged restores are not counted.
pub fn replay_attributes(path: &Path, stat: &UnixStat, ftype: FileType) -> u32 {
    let mut errors = 0u32;
    let root = running_as_root();

    if ftype == FileType::SymLink {
        if let Err(err) = std::os::unix::fs::lchown(path, Some(stat.uid), Some(stat.gid)) {
            let demoted = !root && err.kind() == std::io::ErrorKind::PermissionDenied;
            count_error(&mut errors, demoted, "set link owner", path, &err);
        }
        let atime = FileTime::from_unix_time(stat.atime, 0);
        let mtime = FileTime::from_unix_time(stat.mtime, 0);
        if let Err(err) = filetime::set_symlink_file_times(path, atime, mtime) {
            count_error(&mut errors, false, "set link times", path, &err);
        }
        return errors;
    }

    if let Err(err) = std::os::unix::fs::chown(path, Some(stat.uid), Some(stat.gid)) {
        let demoted = !root && err.kind() == std::io::ErrorKind::PermissionDenied;
        count_error(&mut errors, demoted, "set file owner", path, &err);
    }

    let perms = {
        use std::os::unix::fs::PermissionsExt;
        std::fs::Permissions::from_mode(stat.permissions())
    };
    if let Err(err) = std::fs::set_permissions(path, perms) {
        count_error(&mut errors, false, "set file modes", path, &err);
    }

    let atime = FileTime::from_unix_time(stat.atime, 0);
    let mtime = FileTime::from_unix_time(stat.mtime, 0);
    if let Err(err) = filetime::set_file_times(path, atime, mtime) {
        count_error(&mut errors, false, "set file times", path, &err);
    }

    errors
}

/// Creates a FIFO node.
pub fn create_fifo(path: &Path, mode: u32) -> std::io::Result<()> {
    rustix::fs::mknodat(
        rustix::fs::CWD,
        path,
        rustix::fs::FileType::Fifo,
        rustix::fs::Mode::from_bits_truncate(mode & 0o7777),
        0,
    )
    .map_err(std::io::Error::from)
}

/// Recreates a device node; requires privilege.
pub fn create_device_node(path: &Path, mode: u32, rdev: u64, block: bool) -> std::io::Result<()> {
    let file_type = if block {
        rustix::fs::FileType::BlockDevice
    } else {
        rustix::fs::FileType::CharacterDevice
    };
    rustix::fs::mknodat(
        rustix::fs::CWD,
        path,
        file_type,
        rustix::fs::Mode::from_bits_truncate(mode & 0o7777),
        rdev,
    )
    .map_err(std::io::Error::from)
}

/// Applies a received 32-byte Finder info blob.
#[cfg(all(target_os = "macos", feature = "xattr"))]
pub fn restore_finder_info(path: &Path, info: &[u8]) -> Result<(), crate::MetadataError> {
    xattr::set(path, "com.apple.FinderInfo", info)
        .map_err(|err| crate::MetadataError::Malformed(err.to_string()))
}

/// Applies a received 32-byte Finder info blob.
#[cfg(not(all(target_os = "macos", feature = "xattr")))]
pub fn restore_finder_info(
    _path: &Path,
    _info: &[u8],
) -> Result<(), crate::MetadataError> {
    Err(crate::MetadataError::Unsupported(
        protocol::StreamId::HfsPlusAttributes.code(),
    ))
}

/// Restored length disagreeing with the attribute record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SizeMismatch {
    /// Size announced by the attribute record.
    pub expected: i64,
    /// Size found on disk.
    pub actual: u64,
}

/// Compares a restored file's length with the attribute size.
///
/// Returns the mismatch when one exists; the caller warns and keeps the
/// file. Zero-length results are not compared (the original behaves the
/// same for content-less restores).
pub fn verify_restored_size(file: &mut File, expected: i64) -> std::io::Result<Option<SizeMismatch>> {
    let actual = file.seek(SeekFrom::End(0))?;
    if actual > 0 && expected > 0 && actual != expected as u64 {
        return Ok(Some(SizeMismatch { expected, actual }));
    }
    Ok(None)
}
