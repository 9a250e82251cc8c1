//! Unix metadata backend over POSIX ACLs and extended attributes.
//!
//! ACL capture skips trivial lists (ones that only restate the mode bits)
//! so most files emit no ACL record at all. Default ACLs exist only on
//! directories and travel as their own record. Extended attributes are
//! packed whole-file into one record; the `system.posix_acl_*` names are
//! excluded because the ACL records already carry them.

use std::path::Path;

use flist::{FileEntry, FileType};
use protocol::StreamId;
use tracing::warn;

use crate::backend::{MetadataBackend, MetadataError, MAX_METADATA_ERRORS_PRINTED};
use crate::wire::{
    decode_acl_text, decode_xattr_blob, encode_acl_text, encode_xattr_blob, AclEntryRepr,
    AclKindRepr, XattrPair,
};

#[cfg(target_os = "linux")]
const ACCESS_ACL_STREAM: StreamId = StreamId::XaclLinuxAccess;
#[cfg(target_os = "linux")]
const DEFAULT_ACL_STREAM: Option<StreamId> = Some(StreamId::XaclLinuxDefault);
#[cfg(target_os = "linux")]
const XATTR_STREAM: StreamId = StreamId::XaclLinuxXattr;

#[cfg(target_os = "macos")]
const ACCESS_ACL_STREAM: StreamId = StreamId::XaclDarwinAccess;
#[cfg(target_os = "macos")]
const DEFAULT_ACL_STREAM: Option<StreamId> = None;
#[cfg(target_os = "macos")]
const XATTR_STREAM: StreamId = StreamId::XaclDarwinXattr;

#[cfg(target_os = "freebsd")]
const ACCESS_ACL_STREAM: StreamId = StreamId::XaclFreebsdAccess;
#[cfg(target_os = "freebsd")]
const DEFAULT_ACL_STREAM: Option<StreamId> = Some(StreamId::XaclFreebsdDefault);
#[cfg(target_os = "freebsd")]
const XATTR_STREAM: StreamId = StreamId::XaclFreebsdXattr;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
const ACCESS_ACL_STREAM: StreamId = StreamId::UnixAccessAcl;
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
const DEFAULT_ACL_STREAM: Option<StreamId> = Some(StreamId::UnixDefaultAcl);
#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "freebsd")))]
const XATTR_STREAM: StreamId = StreamId::XaclLinuxXattr;

/// Metadata backend for Unix targets.
#[derive(Debug, Default)]
pub struct UnixBackend {
    acl_errors: u32,
    xattr_errors: u32,
}

impl UnixBackend {
    /// Creates the backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn count_acl_error(&mut self, path: &Path, message: &str) {
        self.acl_errors += 1;
        if self.acl_errors <= MAX_METADATA_ERRORS_PRINTED {
            warn!(path = %path.display(), "{message}");
        }
    }

    fn count_xattr_error(&mut self, path: &Path, message: &str) {
        self.xattr_errors += 1;
        if self.xattr_errors <= MAX_METADATA_ERRORS_PRINTED {
            warn!(path = %path.display(), "{message}");
        }
    }

    /// True when this platform emits `stream` for ACLs.
    #[must_use]
    pub fn handles_acl_stream(stream: StreamId) -> bool {
        stream == ACCESS_ACL_STREAM || DEFAULT_ACL_STREAM == Some(stream)
    }

    /// True when this platform emits `stream` for xattrs.
    #[must_use]
    pub fn handles_xattr_stream(stream: StreamId) -> bool {
        stream == XATTR_STREAM
    }
}

/// An ACL that merely restates the mode bits carries no information.
#[cfg(feature = "acl")]
fn is_trivial_acl(entries: &[AclEntryRepr]) -> bool {
    entries.iter().all(|entry| {
        entry.name.is_empty() && entry.flags == 0 && entry.kind != AclKindRepr::Mask
    })
}

#[cfg(feature = "acl")]
mod acl_support {
    use super::{AclEntryRepr, AclKindRepr};
    use exacl::{AclEntry, AclEntryKind, Flag, Perm};

    pub(super) const DEFAULT_FLAG_BIT: u32 = Flag::DEFAULT.bits();

    pub(super) fn to_repr(entry: &AclEntry) -> AclEntryRepr {
        AclEntryRepr {
            allow: entry.allow,
            kind: kind_to_repr(entry.kind),
            perms: entry.perms.bits(),
            flags: entry.flags.bits(),
            name: entry.name.clone(),
        }
    }

    pub(super) fn from_repr(repr: &AclEntryRepr) -> Option<AclEntry> {
        Some(AclEntry {
            kind: kind_from_repr(repr.kind)?,
            name: repr.name.clone(),
            perms: Perm::from_bits_truncate(repr.perms),
            flags: Flag::from_bits_truncate(repr.flags),
            allow: repr.allow,
        })
    }

    #[allow(unreachable_patterns)]
    fn kind_to_repr(kind: AclEntryKind) -> AclKindRepr {
        match kind {
            AclEntryKind::User => AclKindRepr::User,
            AclEntryKind::Group => AclKindRepr::Group,
            #[cfg(any(target_os = "linux", target_os = "freebsd"))]
            AclEntryKind::Mask => AclKindRepr::Mask,
            #[cfg(any(target_os = "linux", target_os = "freebsd"))]
            AclEntryKind::Other => AclKindRepr::Other,
            #[cfg(any(target_os = "macos", target_os = "freebsd"))]
            AclEntryKind::Everyone => AclKindRepr::Everyone,
            _ => AclKindRepr::Unknown,
        }
    }

    #[allow(unreachable_patterns)]
    fn kind_from_repr(repr: AclKindRepr) -> Option<AclEntryKind> {
        match repr {
            AclKindRepr::User => Some(AclEntryKind::User),
            AclKindRepr::Group => Some(AclEntryKind::Group),
            #[cfg(any(target_os = "linux", target_os = "freebsd"))]
            AclKindRepr::Mask => Some(AclEntryKind::Mask),
            #[cfg(any(target_os = "linux", target_os = "freebsd"))]
            AclKindRepr::Other => Some(AclEntryKind::Other),
            #[cfg(any(target_os = "macos", target_os = "freebsd"))]
            AclKindRepr::Everyone => Some(AclEntryKind::Everyone),
            _ => None,
        }
    }
}

impl MetadataBackend for UnixBackend {
    fn backup_acl(
        &mut self,
        entry: &FileEntry,
    ) -> Result<Vec<(StreamId, Vec<u8>)>, MetadataError> {
        if entry.ftype == FileType::SymLink {
            return Ok(Vec::new());
        }

        #[cfg(feature = "acl")]
        {
            let listed = match exacl::getfacl(&entry.path, None) {
                Ok(listed) => listed,
                Err(err) => {
                    self.count_acl_error(&entry.path, &format!("cannot read ACL: {err}"));
                    return Ok(Vec::new());
                }
            };
            let reprs: Vec<AclEntryRepr> = listed.iter().map(acl_support::to_repr).collect();

            let (default, access): (Vec<_>, Vec<_>) = reprs
                .into_iter()
                .partition(|repr| repr.flags & acl_support::DEFAULT_FLAG_BIT != 0);

            let mut records = Vec::new();
            if !is_trivial_acl(&access) {
                records.push((ACCESS_ACL_STREAM, encode_acl_text(&access)));
            }
            if !default.is_empty() {
                if let Some(stream) = DEFAULT_ACL_STREAM {
                    if entry.ftype == FileType::DirEnd {
                        records.push((stream, encode_acl_text(&default)));
                    }
                }
            }
            Ok(records)
        }

        #[cfg(not(feature = "acl"))]
        {
            let _ = entry;
            Ok(Vec::new())
        }
    }

    fn backup_xattr(
        &mut self,
        entry: &FileEntry,
    ) -> Result<Vec<(StreamId, Vec<u8>)>, MetadataError> {
        if entry.ftype == FileType::SymLink {
            return Ok(Vec::new());
        }

        #[cfg(feature = "xattr")]
        {
            let names = match xattr::list(&entry.path) {
                Ok(names) => names,
                Err(err) => {
                    self.count_xattr_error(&entry.path, &format!("cannot list xattrs: {err}"));
                    return Ok(Vec::new());
                }
            };

            let mut pairs = Vec::new();
            for name in names {
                let text = name.to_string_lossy();
                if text.starts_with("system.posix_acl_") || text.starts_with("system.nfs4_acl") {
                    continue;
                }
                match xattr::get(&entry.path, &name) {
                    Ok(Some(value)) => pairs.push(XattrPair {
                        name: text.into_owned().into_bytes(),
                        value,
                    }),
                    Ok(None) => {}
                    Err(err) => {
                        self.count_xattr_error(
                            &entry.path,
                            &format!("cannot read xattr {}: {err}", text),
                        );
                    }
                }
            }

            if pairs.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![(XATTR_STREAM, encode_xattr_blob(&pairs))])
            }
        }

        #[cfg(not(feature = "xattr"))]
        {
            let _ = entry;
            Ok(Vec::new())
        }
    }

    fn restore_acl(
        &mut self,
        path: &Path,
        stream: StreamId,
        payload: &[u8],
    ) -> Result<(), MetadataError> {
        if !Self::handles_acl_stream(stream) {
            return Err(MetadataError::Unsupported(stream.code()));
        }

        #[cfg(feature = "acl")]
        {
            let reprs = decode_acl_text(payload)
                .map_err(|err| MetadataError::Malformed(err.to_string()))?;
            let mut entries = Vec::with_capacity(reprs.len());
            for repr in &reprs {
                match acl_support::from_repr(repr) {
                    Some(entry) => entries.push(entry),
                    None => self.count_acl_error(path, "ACL entry kind not representable here"),
                }
            }

            // Default-ACL records replace the default list; access records
            // must keep an existing default list intact, so merge it back.
            if stream == ACCESS_ACL_STREAM {
                if let Ok(existing) = exacl::getfacl(path, None) {
                    entries.extend(existing.into_iter().filter(|entry| {
                        acl_support::to_repr(entry).flags & acl_support::DEFAULT_FLAG_BIT != 0
                    }));
                }
            } else if let Ok(existing) = exacl::getfacl(path, None) {
                entries.extend(existing.into_iter().filter(|entry| {
                    acl_support::to_repr(entry).flags & acl_support::DEFAULT_FLAG_BIT == 0
                }));
            }

            if let Err(err) = exacl::setfacl(&[path], &entries, None) {
                self.count_acl_error(path, &format!("cannot apply ACL: {err}"));
            }
            Ok(())
        }

        #[cfg(not(feature = "acl"))]
        {
            let _ = (path, payload);
            Err(MetadataError::Unsupported(stream.code()))
        }
    }

    fn restore_xattr(
        &mut self,
        path: &Path,
        stream: StreamId,
        payload: &[u8],
    ) -> Result<(), MetadataError> {
        if !Self::handles_xattr_stream(stream) {
            return Err(MetadataError::Unsupported(stream.code()));
        }

        #[cfg(feature = "xattr")]
        {
            let pairs = decode_xattr_blob(payload)
                .map_err(|err| MetadataError::Malformed(err.to_string()))?;
            for pair in pairs {
                let name = String::from_utf8_lossy(&pair.name).into_owned();
                if let Err(err) = xattr::set(path, &name, &pair.value) {
                    self.count_xattr_error(path, &format!("cannot set xattr {name}: {err}"));
                }
            }
            Ok(())
        }

        #[cfg(not(feature = "xattr"))]
        {
            let _ = (path, payload);
            Err(MetadataError::Unsupported(stream.code()))
        }
    }

    fn acl_errors(&self) -> u32 {
        self.acl_errors
    }

    fn xattr_errors(&self) -> u32 {
        self.xattr_errors
    }
}
