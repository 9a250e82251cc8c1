//! Classification catalog and per-entry options.

use std::fmt;

/// Classification of a filesystem object as decided by the traversal layer.
///
/// The numeric codes travel inside attribute records and are wire-stable.
/// Several variants are pure markers (`*Mark`, the failure classes): they
/// produce either an attributes-only record or a logged skip, never data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Hard link to a file whose data was already saved under another path.
    HardlinkRef,
    /// Regular file known to be empty.
    RegularEmpty,
    /// Regular file with data.
    Regular,
    /// Symbolic link.
    SymLink,
    /// Directory entry, emitted after its contents.
    DirEnd,
    /// Special file (socket, device node found without raw access).
    Special,
    /// Object that could not be accessed.
    NotAccessible,
    /// Symlink that could not be followed.
    FollowFailed,
    /// Object that could not be stat-ed.
    StatFailed,
    /// File unchanged since the reference backup; skipped.
    UnchangedSkip,
    /// File skipped because its archive bit was unset.
    ArchiveSkip,
    /// Directory not descended into because recursion is off.
    NoRecurseMark,
    /// Directory on a different filesystem; not descended into.
    DifferentFSMark,
    /// Directory that could not be opened.
    OpenFailed,
    /// Raw device backed up through its device node.
    RawDevice,
    /// Named pipe whose content is read under a watchdog.
    Fifo,
    /// Directory entry, emitted before its contents; never sent.
    DirBegin,
    /// Directory on a disallowed filesystem; not descended into.
    DisallowedFSMark,
    /// Drive of a disallowed type; not descended into.
    DisallowedDriveMark,
    /// Reparse point.
    Reparse,
    /// File recorded as deleted since the reference backup.
    Deleted,
    /// Configuration payload replayed first on restore.
    RestoreObject,
    /// Junction point.
    Junction,
    /// Plugin configuration object.
    PluginConfig,
}

impl FileType {
    /// Wire code carried in attribute records.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::HardlinkRef => 1,
            Self::RegularEmpty => 2,
            Self::Regular => 3,
            Self::SymLink => 4,
            Self::DirEnd => 5,
            Self::Special => 6,
            Self::NotAccessible => 7,
            Self::FollowFailed => 8,
            Self::StatFailed => 9,
            Self::UnchangedSkip => 10,
            Self::ArchiveSkip => 12,
            Self::NoRecurseMark => 13,
            Self::DifferentFSMark => 14,
            Self::OpenFailed => 15,
            Self::RawDevice => 16,
            Self::Fifo => 17,
            Self::DirBegin => 18,
            Self::DisallowedFSMark => 19,
            Self::DisallowedDriveMark => 20,
            Self::Reparse => 21,
            Self::Deleted => 23,
            Self::RestoreObject => 25,
            Self::Junction => 26,
            Self::PluginConfig => 27,
        }
    }

    /// True for link-bearing types whose attribute record carries a target.
    #[must_use]
    pub const fn carries_link(self) -> bool {
        matches!(self, Self::SymLink | Self::HardlinkRef)
    }

    /// True for directory-like types whose canonical name is the link field.
    #[must_use]
    pub const fn is_directory_like(self) -> bool {
        matches!(self, Self::DirEnd | Self::Reparse | Self::Junction)
    }

    /// True for restore-object payloads that carry metadata only.
    #[must_use]
    pub const fn is_object(self) -> bool {
        matches!(self, Self::RestoreObject | Self::PluginConfig)
    }
}

impl TryFrom<i32> for FileType {
    type Error = UnknownFileType;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let ftype = match code {
            1 => Self::HardlinkRef,
            2 => Self::RegularEmpty,
            3 => Self::Regular,
            4 => Self::SymLink,
            5 => Self::DirEnd,
            6 => Self::Special,
            7 => Self::NotAccessible,
            8 => Self::FollowFailed,
            9 => Self::StatFailed,
            10 => Self::UnchangedSkip,
            12 => Self::ArchiveSkip,
            13 => Self::NoRecurseMark,
            14 => Self::DifferentFSMark,
            15 => Self::OpenFailed,
            16 => Self::RawDevice,
            17 => Self::Fifo,
            18 => Self::DirBegin,
            19 => Self::DisallowedFSMark,
            20 => Self::DisallowedDriveMark,
            21 => Self::Reparse,
            23 => Self::Deleted,
            25 => Self::RestoreObject,
            26 => Self::Junction,
            27 => Self::PluginConfig,
            other => return Err(UnknownFileType(other)),
        };
        Ok(ftype)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Error returned when an attribute record names an unknown classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown file type code {0}")]
pub struct UnknownFileType(pub i32);

/// Per-entry option bit set.
///
/// The bits select transform-chain stages and follow-up records for one
/// entry. They never travel on the wire; only the resulting data-stream
/// identifier does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FileOptions(u32);

impl FileOptions {
    /// Elide all-zero blocks and prefix blocks with their file address.
    pub const SPARSE: Self = Self(1 << 0);
    /// Prefix every block with the device read offset.
    pub const OFFSETS: Self = Self(1 << 1);
    /// Encrypt the data stream.
    pub const ENCRYPT: Self = Self(1 << 2);
    /// Compress the data stream.
    pub const COMPRESS: Self = Self(1 << 3);
    /// Disable the OS-native multi-stream layout.
    pub const PORTABLE: Self = Self(1 << 4);
    /// Do not update the source's access time while reading.
    pub const NO_ATIME: Self = Self(1 << 5);
    /// Emit resource-fork and Finder-info follow-up records.
    pub const HFS_PLUS: Self = Self(1 << 6);
    /// Strip leading path components before emission.
    pub const STRIP_PATH: Self = Self(1 << 7);
    /// Re-stat after reading and warn when the source changed underneath.
    pub const CHECK_CHANGES: Self = Self(1 << 8);
    /// Emit ACL follow-up records.
    pub const ACL: Self = Self(1 << 9);
    /// Emit extended-attribute follow-up records.
    pub const XATTR: Self = Self(1 << 10);

    /// The empty option set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// True when every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `self` with the bits of `other` added.
    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `self` with the bits of `other` removed.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Adds the bits of `other` in place.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Removes the bits of `other` in place.
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for FileOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for FileOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
