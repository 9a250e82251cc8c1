//! The metadata-backend seam.

use std::path::Path;

use flist::FileEntry;
use protocol::StreamId;

/// Non-fatal backend errors stop being logged after this many per class.
pub const MAX_METADATA_ERRORS_PRINTED: u32 = 25;

/// Errors surfaced by a metadata backend.
///
/// Almost everything a backend can fail at is per-file and non-fatal; such
/// failures are counted inside the backend and never reach the caller.
/// [`MetadataError::Fatal`] is reserved for failures that poison the whole
/// job.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    /// The job cannot continue.
    #[error("fatal metadata error: {0}")]
    Fatal(String),
    /// The payload for a restore operation did not parse.
    #[error("malformed metadata stream payload: {0}")]
    Malformed(String),
    /// The stream is not one this backend implements.
    #[error("metadata stream {0} not supported on this platform")]
    Unsupported(i32),
}

/// Captures and replays ACLs and extended attributes.
///
/// `backup_*` return the records to emit for an entry, zero or more
/// `(stream, payload)` pairs. `restore_*` apply one received record to a
/// restored file. Per-file failures are counted internally (see
/// [`MetadataBackend::acl_errors`] / [`MetadataBackend::xattr_errors`]) and
/// logged only below [`MAX_METADATA_ERRORS_PRINTED`].
pub trait MetadataBackend {
    /// Captures ACL records for `entry`.
    fn backup_acl(&mut self, entry: &FileEntry)
        -> Result<Vec<(StreamId, Vec<u8>)>, MetadataError>;

    /// Captures extended-attribute records for `entry`.
    fn backup_xattr(
        &mut self,
        entry: &FileEntry,
    ) -> Result<Vec<(StreamId, Vec<u8>)>, MetadataError>;

    /// Applies one received ACL record to `path`.
    fn restore_acl(
        &mut self,
        path: &Path,
        stream: StreamId,
        payload: &[u8],
    ) -> Result<(), MetadataError>;

    /// Applies one received extended-attribute record to `path`.
    fn restore_xattr(
        &mut self,
        path: &Path,
        stream: StreamId,
        payload: &[u8],
    ) -> Result<(), MetadataError>;

    /// Non-fatal ACL errors accumulated so far.
    fn acl_errors(&self) -> u32;

    /// Non-fatal xattr errors accumulated so far.
    fn xattr_errors(&self) -> u32;
}

/// Backend that captures nothing and applies nothing.
///
/// Used when the job disables metadata handling and on platforms without an
/// implementation; restore counts unsupported streams instead of failing.
#[derive(Debug, Default)]
pub struct NullBackend {
    unsupported: u32,
}

impl NullBackend {
    /// Creates the null backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of restore records this backend had to ignore.
    #[must_use]
    pub const fn ignored(&self) -> u32 {
        self.unsupported
    }
}

impl MetadataBackend for NullBackend {
    fn backup_acl(
        &mut self,
        _entry: &FileEntry,
    ) -> Result<Vec<(StreamId, Vec<u8>)>, MetadataError> {
        Ok(Vec::new())
    }

    fn backup_xattr(
        &mut self,
        _entry: &FileEntry,
    ) -> Result<Vec<(StreamId, Vec<u8>)>, MetadataError> {
        Ok(Vec::new())
    }

    fn restore_acl(
        &mut self,
        _path: &Path,
        stream: StreamId,
        _payload: &[u8],
    ) -> Result<(), MetadataError> {
        self.unsupported += 1;
        Err(MetadataError::Unsupported(stream.code()))
    }

    fn restore_xattr(
        &mut self,
        _path: &Path,
        stream: StreamId,
        _payload: &[u8],
    ) -> Result<(), MetadataError> {
        self.unsupported += 1;
        Err(MetadataError::Unsupported(stream.code()))
    }

    fn acl_errors(&self) -> u32 {
        0
    }

    fn xattr_errors(&self) -> u32 {
        0
    }
}
