//! The closed stream-identifier catalog.
//!
//! Every record on the wire carries one of these identifiers. The numeric
//! values are part of the wire protocol and must interoperate with archives
//! written by older agents, so the catalog is append-only and the values
//! below are never renumbered.

/// Identifies the payload semantics of a framed record.
///
/// The catalog splits into families: attribute streams, data streams (plain,
/// sparse, compressed, encrypted, and the native-layout `Win32` parallels),
/// resource-fork streams, ACL/xattr metadata streams, and digest/signature
/// streams. Helper predicates on this type encode the family membership the
/// pipelines dispatch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamId {
    /// Unix `stat`-tuple attribute packet.
    UnixAttributes,
    /// Plain file content.
    FileData,
    /// MD5 file-verify digest.
    Md5Digest,
    /// zlib-compressed file content.
    GzipData,
    /// Extended attribute packet (native-layout platforms).
    UnixAttributesEx,
    /// File content with an 8-byte file-address prefix; all-zero blocks elided.
    SparseData,
    /// Sparse-encoded, zlib-compressed file content.
    SparseGzipData,
    /// Names of programs producing program data streams.
    ProgramNames,
    /// Opaque program-produced data.
    ProgramData,
    /// SHA-1 file-verify digest.
    Sha1Digest,
    /// Native-layout (BackupRead-style) file content.
    Win32Data,
    /// Native-layout, zlib-compressed file content.
    Win32GzipData,
    /// Resource-fork content.
    MacosForkData,
    /// 32-byte Finder info blob.
    HfsPlusAttributes,
    /// Legacy access-ACL stream.
    UnixAccessAcl,
    /// Legacy default-ACL stream.
    UnixDefaultAcl,
    /// SHA-256 file-verify digest.
    Sha256Digest,
    /// SHA-512 file-verify digest.
    Sha512Digest,
    /// Detached signature over the job signing digest.
    SignedDigest,
    /// Encrypted plain file content.
    EncryptedFileData,
    /// Encrypted native-layout file content.
    EncryptedWin32Data,
    /// Wrapped per-job session keys.
    EncryptedSessionData,
    /// Encrypted, zlib-compressed file content.
    EncryptedFileGzipData,
    /// Encrypted, zlib-compressed native-layout content.
    EncryptedWin32GzipData,
    /// Encrypted resource-fork content.
    EncryptedMacosForkData,
    /// Plugin name marker.
    PluginName,
    /// Plugin-produced data.
    PluginData,
    /// Restore object (configuration payload replayed at restore start).
    RestoreObject,
    /// Block-compressed file content (12-byte compression header framing).
    CompressedData,
    /// Sparse-encoded, block-compressed file content.
    SparseCompressedData,
    /// Native-layout, block-compressed file content.
    Win32CompressedData,
    /// Encrypted, block-compressed file content.
    EncryptedFileCompressedData,
    /// Encrypted, block-compressed native-layout content.
    EncryptedWin32CompressedData,
    /// AIX text-form ACL.
    XaclAixText,
    /// Darwin access ACL.
    XaclDarwinAccess,
    /// FreeBSD default ACL.
    XaclFreebsdDefault,
    /// FreeBSD access ACL.
    XaclFreebsdAccess,
    /// HP-UX ACL entries.
    XaclHpuxAclEntry,
    /// IRIX default ACL.
    XaclIrixDefault,
    /// IRIX access ACL.
    XaclIrixAccess,
    /// Linux default ACL.
    XaclLinuxDefault,
    /// Linux access ACL.
    XaclLinuxAccess,
    /// Tru64 default ACL.
    XaclTru64Default,
    /// Tru64 default directory ACL.
    XaclTru64DefaultDir,
    /// Tru64 access ACL.
    XaclTru64Access,
    /// Solaris POSIX-draft ACL.
    XaclSolarisPosix,
    /// Solaris NFSv4 ACL.
    XaclSolarisNfs4,
    /// AFS text-form ACL.
    XaclAfsText,
    /// AIX classic ACL.
    XaclAixAixc,
    /// AIX NFSv4 ACL.
    XaclAixNfs4,
    /// FreeBSD NFSv4 ACL.
    XaclFreebsdNfs4,
    /// Hurd default ACL.
    XaclHurdDefault,
    /// Hurd access ACL.
    XaclHurdAccess,
    /// Hurd extended attributes.
    XaclHurdXattr,
    /// IRIX extended attributes.
    XaclIrixXattr,
    /// Tru64 extended attributes.
    XaclTru64Xattr,
    /// AIX extended attributes.
    XaclAixXattr,
    /// OpenBSD extended attributes.
    XaclOpenbsdXattr,
    /// Solaris system extended attributes.
    XaclSolarisSysXattr,
    /// Solaris extended attributes (applied immediately, never delayed).
    XaclSolarisXattr,
    /// Darwin extended attributes.
    XaclDarwinXattr,
    /// FreeBSD extended attributes.
    XaclFreebsdXattr,
    /// Linux extended attributes.
    XaclLinuxXattr,
    /// NetBSD extended attributes.
    XaclNetbsdXattr,
    /// Plugin-provided ACL payload.
    XaclPluginAcl,
    /// Plugin-provided xattr payload.
    XaclPluginXattr,
}

impl StreamId {
    /// Returns the wire value of this stream identifier.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::UnixAttributes => 1,
            Self::FileData => 2,
            Self::Md5Digest => 3,
            Self::GzipData => 4,
            Self::UnixAttributesEx => 5,
            Self::SparseData => 6,
            Self::SparseGzipData => 7,
            Self::ProgramNames => 8,
            Self::ProgramData => 9,
            Self::Sha1Digest => 10,
            Self::Win32Data => 11,
            Self::Win32GzipData => 12,
            Self::MacosForkData => 13,
            Self::HfsPlusAttributes => 14,
            Self::UnixAccessAcl => 15,
            Self::UnixDefaultAcl => 16,
            Self::Sha256Digest => 17,
            Self::Sha512Digest => 18,
            Self::SignedDigest => 19,
            Self::EncryptedFileData => 20,
            Self::EncryptedWin32Data => 21,
            Self::EncryptedSessionData => 22,
            Self::EncryptedFileGzipData => 23,
            Self::EncryptedWin32GzipData => 24,
            Self::EncryptedMacosForkData => 25,
            Self::PluginName => 26,
            Self::PluginData => 27,
            Self::RestoreObject => 28,
            Self::CompressedData => 29,
            Self::SparseCompressedData => 30,
            Self::Win32CompressedData => 31,
            Self::EncryptedFileCompressedData => 32,
            Self::EncryptedWin32CompressedData => 33,
            Self::XaclAixText => 1000,
            Self::XaclDarwinAccess => 1001,
            Self::XaclFreebsdDefault => 1002,
            Self::XaclFreebsdAccess => 1003,
            Self::XaclHpuxAclEntry => 1004,
            Self::XaclIrixDefault => 1005,
            Self::XaclIrixAccess => 1006,
            Self::XaclLinuxDefault => 1007,
            Self::XaclLinuxAccess => 1008,
            Self::XaclTru64Default => 1009,
            Self::XaclTru64DefaultDir => 1010,
            Self::XaclTru64Access => 1011,
            Self::XaclSolarisPosix => 1012,
            Self::XaclSolarisNfs4 => 1013,
            Self::XaclAfsText => 1014,
            Self::XaclAixAixc => 1015,
            Self::XaclAixNfs4 => 1016,
            Self::XaclFreebsdNfs4 => 1017,
            Self::XaclHurdDefault => 1018,
            Self::XaclHurdAccess => 1019,
            Self::XaclHurdXattr => 1020,
            Self::XaclIrixXattr => 1021,
            Self::XaclTru64Xattr => 1022,
            Self::XaclAixXattr => 1023,
            Self::XaclOpenbsdXattr => 1024,
            Self::XaclSolarisSysXattr => 1025,
            Self::XaclSolarisXattr => 1026,
            Self::XaclDarwinXattr => 1027,
            Self::XaclFreebsdXattr => 1028,
            Self::XaclLinuxXattr => 1029,
            Self::XaclNetbsdXattr => 1030,
            Self::XaclPluginAcl => 1031,
            Self::XaclPluginXattr => 1032,
        }
    }

    /// True for every stream that carries file content bytes.
    #[must_use]
    pub const fn is_data(self) -> bool {
        matches!(
            self,
            Self::FileData
                | Self::SparseData
                | Self::Win32Data
                | Self::GzipData
                | Self::SparseGzipData
                | Self::Win32GzipData
                | Self::CompressedData
                | Self::SparseCompressedData
                | Self::Win32CompressedData
                | Self::EncryptedFileData
                | Self::EncryptedWin32Data
                | Self::EncryptedFileGzipData
                | Self::EncryptedWin32GzipData
                | Self::EncryptedFileCompressedData
                | Self::EncryptedWin32CompressedData
        )
    }

    /// True when blocks carry the 8-byte file-address prefix.
    #[must_use]
    pub const fn is_sparse(self) -> bool {
        matches!(
            self,
            Self::SparseData | Self::SparseGzipData | Self::SparseCompressedData
        )
    }

    /// True for the zlib-compressed data streams.
    #[must_use]
    pub const fn is_gzip(self) -> bool {
        matches!(
            self,
            Self::GzipData
                | Self::SparseGzipData
                | Self::Win32GzipData
                | Self::EncryptedFileGzipData
                | Self::EncryptedWin32GzipData
        )
    }

    /// True for the block-compressed data streams (12-byte header framing).
    #[must_use]
    pub const fn is_block_compressed(self) -> bool {
        matches!(
            self,
            Self::CompressedData
                | Self::SparseCompressedData
                | Self::Win32CompressedData
                | Self::EncryptedFileCompressedData
                | Self::EncryptedWin32CompressedData
        )
    }

    /// True for any compressed data stream.
    #[must_use]
    pub const fn is_compressed(self) -> bool {
        self.is_gzip() || self.is_block_compressed()
    }

    /// True for the encrypted data and fork streams.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(
            self,
            Self::EncryptedFileData
                | Self::EncryptedWin32Data
                | Self::EncryptedFileGzipData
                | Self::EncryptedWin32GzipData
                | Self::EncryptedFileCompressedData
                | Self::EncryptedWin32CompressedData
                | Self::EncryptedMacosForkData
        )
    }

    /// True for the native-layout (`Win32`) data family.
    #[must_use]
    pub const fn is_win32(self) -> bool {
        matches!(
            self,
            Self::Win32Data
                | Self::Win32GzipData
                | Self::Win32CompressedData
                | Self::EncryptedWin32Data
                | Self::EncryptedWin32GzipData
                | Self::EncryptedWin32CompressedData
        )
    }

    /// True for the resource-fork streams.
    #[must_use]
    pub const fn is_fork(self) -> bool {
        matches!(self, Self::MacosForkData | Self::EncryptedMacosForkData)
    }

    /// True for the attribute streams.
    #[must_use]
    pub const fn is_attributes(self) -> bool {
        matches!(self, Self::UnixAttributes | Self::UnixAttributesEx)
    }

    /// True for the file-verify digest streams.
    #[must_use]
    pub const fn is_digest(self) -> bool {
        matches!(
            self,
            Self::Md5Digest | Self::Sha1Digest | Self::Sha256Digest | Self::Sha512Digest
        )
    }

    /// True for every ACL metadata stream.
    #[must_use]
    pub const fn is_acl(self) -> bool {
        matches!(
            self,
            Self::UnixAccessAcl
                | Self::UnixDefaultAcl
                | Self::XaclAixText
                | Self::XaclDarwinAccess
                | Self::XaclFreebsdDefault
                | Self::XaclFreebsdAccess
                | Self::XaclHpuxAclEntry
                | Self::XaclIrixDefault
                | Self::XaclIrixAccess
                | Self::XaclLinuxDefault
                | Self::XaclLinuxAccess
                | Self::XaclTru64Default
                | Self::XaclTru64DefaultDir
                | Self::XaclTru64Access
                | Self::XaclSolarisPosix
                | Self::XaclSolarisNfs4
                | Self::XaclAfsText
                | Self::XaclAixAixc
                | Self::XaclAixNfs4
                | Self::XaclFreebsdNfs4
                | Self::XaclHurdDefault
                | Self::XaclHurdAccess
                | Self::XaclPluginAcl
        )
    }

    /// True for every extended-attribute metadata stream.
    #[must_use]
    pub const fn is_xattr(self) -> bool {
        matches!(
            self,
            Self::XaclHurdXattr
                | Self::XaclIrixXattr
                | Self::XaclTru64Xattr
                | Self::XaclAixXattr
                | Self::XaclOpenbsdXattr
                | Self::XaclSolarisSysXattr
                | Self::XaclSolarisXattr
                | Self::XaclDarwinXattr
                | Self::XaclFreebsdXattr
                | Self::XaclLinuxXattr
                | Self::XaclNetbsdXattr
                | Self::XaclPluginXattr
        )
    }

    /// Maps a base data stream onto its zlib-compressed variant.
    #[must_use]
    pub const fn gzip_variant(self) -> Option<Self> {
        match self {
            Self::FileData => Some(Self::GzipData),
            Self::SparseData => Some(Self::SparseGzipData),
            Self::Win32Data => Some(Self::Win32GzipData),
            _ => None,
        }
    }

    /// Maps a base data stream onto its block-compressed variant.
    #[must_use]
    pub const fn block_compressed_variant(self) -> Option<Self> {
        match self {
            Self::FileData => Some(Self::CompressedData),
            Self::SparseData => Some(Self::SparseCompressedData),
            Self::Win32Data => Some(Self::Win32CompressedData),
            _ => None,
        }
    }

    /// Maps a data stream onto its encrypted variant.
    ///
    /// Sparse streams have no encrypted variant: the file-address prefix must
    /// stay in cleartext, so encryption is cleared before stream selection
    /// reaches this table.
    #[must_use]
    pub const fn encrypted_variant(self) -> Option<Self> {
        match self {
            Self::FileData => Some(Self::EncryptedFileData),
            Self::Win32Data => Some(Self::EncryptedWin32Data),
            Self::GzipData => Some(Self::EncryptedFileGzipData),
            Self::Win32GzipData => Some(Self::EncryptedWin32GzipData),
            Self::CompressedData => Some(Self::EncryptedFileCompressedData),
            Self::Win32CompressedData => Some(Self::EncryptedWin32CompressedData),
            Self::MacosForkData => Some(Self::EncryptedMacosForkData),
            _ => None,
        }
    }
}

impl TryFrom<i32> for StreamId {
    type Error = UnknownStream;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        let id = match code {
            1 => Self::UnixAttributes,
            2 => Self::FileData,
            3 => Self::Md5Digest,
            4 => Self::GzipData,
            5 => Self::UnixAttributesEx,
            6 => Self::SparseData,
            7 => Self::SparseGzipData,
            8 => Self::ProgramNames,
            9 => Self::ProgramData,
            10 => Self::Sha1Digest,
            11 => Self::Win32Data,
            12 => Self::Win32GzipData,
            13 => Self::MacosForkData,
            14 => Self::HfsPlusAttributes,
            15 => Self::UnixAccessAcl,
            16 => Self::UnixDefaultAcl,
            17 => Self::Sha256Digest,
            18 => Self::Sha512Digest,
            19 => Self::SignedDigest,
            20 => Self::EncryptedFileData,
            21 => Self::EncryptedWin32Data,
            22 => Self::EncryptedSessionData,
            23 => Self::EncryptedFileGzipData,
            24 => Self::EncryptedWin32GzipData,
            25 => Self::EncryptedMacosForkData,
            26 => Self::PluginName,
            27 => Self::PluginData,
            28 => Self::RestoreObject,
            29 => Self::CompressedData,
            30 => Self::SparseCompressedData,
            31 => Self::Win32CompressedData,
            32 => Self::EncryptedFileCompressedData,
            33 => Self::EncryptedWin32CompressedData,
            1000 => Self::XaclAixText,
            1001 => Self::XaclDarwinAccess,
            1002 => Self::XaclFreebsdDefault,
            1003 => Self::XaclFreebsdAccess,
            1004 => Self::XaclHpuxAclEntry,
            1005 => Self::XaclIrixDefault,
            1006 => Self::XaclIrixAccess,
            1007 => Self::XaclLinuxDefault,
            1008 => Self::XaclLinuxAccess,
            1009 => Self::XaclTru64Default,
            1010 => Self::XaclTru64DefaultDir,
            1011 => Self::XaclTru64Access,
            1012 => Self::XaclSolarisPosix,
            1013 => Self::XaclSolarisNfs4,
            1014 => Self::XaclAfsText,
            1015 => Self::XaclAixAixc,
            1016 => Self::XaclAixNfs4,
            1017 => Self::XaclFreebsdNfs4,
            1018 => Self::XaclHurdDefault,
            1019 => Self::XaclHurdAccess,
            1020 => Self::XaclHurdXattr,
            1021 => Self::XaclIrixXattr,
            1022 => Self::XaclTru64Xattr,
            1023 => Self::XaclAixXattr,
            1024 => Self::XaclOpenbsdXattr,
            1025 => Self::XaclSolarisSysXattr,
            1026 => Self::XaclSolarisXattr,
            1027 => Self::XaclDarwinXattr,
            1028 => Self::XaclFreebsdXattr,
            1029 => Self::XaclLinuxXattr,
            1030 => Self::XaclNetbsdXattr,
            1031 => Self::XaclPluginAcl,
            1032 => Self::XaclPluginXattr,
            other => return Err(UnknownStream(other)),
        };
        Ok(id)
    }
}

/// Error returned when a wire value does not name a catalog stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown stream id {0}")]
pub struct UnknownStream(pub i32);

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[StreamId] = &[
        StreamId::UnixAttributes,
        StreamId::FileData,
        StreamId::Md5Digest,
        StreamId::GzipData,
        StreamId::UnixAttributesEx,
        StreamId::SparseData,
        StreamId::SparseGzipData,
        StreamId::ProgramNames,
        StreamId::ProgramData,
        StreamId::Sha1Digest,
        StreamId::Win32Data,
        StreamId::Win32GzipData,
        StreamId::MacosForkData,
        StreamId::HfsPlusAttributes,
        StreamId::UnixAccessAcl,
        StreamId::UnixDefaultAcl,
        StreamId::Sha256Digest,
        StreamId::Sha512Digest,
        StreamId::SignedDigest,
        StreamId::EncryptedFileData,
        StreamId::EncryptedWin32Data,
        StreamId::EncryptedSessionData,
        StreamId::EncryptedFileGzipData,
        StreamId::EncryptedWin32GzipData,
        StreamId::EncryptedMacosForkData,
        StreamId::PluginName,
        StreamId::PluginData,
        StreamId::RestoreObject,
        StreamId::CompressedData,
        StreamId::SparseCompressedData,
        StreamId::Win32CompressedData,
        StreamId::EncryptedFileCompressedData,
        StreamId::EncryptedWin32CompressedData,
        StreamId::XaclAixText,
        StreamId::XaclDarwinAccess,
        StreamId::XaclFreebsdDefault,
        StreamId::XaclFreebsdAccess,
        StreamId::XaclHpuxAclEntry,
        StreamId::XaclIrixDefault,
        StreamId::XaclIrixAccess,
        StreamId::XaclLinuxDefault,
        StreamId::XaclLinuxAccess,
        StreamId::XaclTru64Default,
        StreamId::XaclTru64DefaultDir,
        StreamId::XaclTru64Access,
        StreamId::XaclSolarisPosix,
        StreamId::XaclSolarisNfs4,
        StreamId::XaclAfsText,
        StreamId::XaclAixAixc,
        StreamId::XaclAixNfs4,
        StreamId::XaclFreebsdNfs4,
        StreamId::XaclHurdDefault,
        StreamId::XaclHurdAccess,
        StreamId::XaclHurdXattr,
        StreamId::XaclIrixXattr,
        StreamId::XaclTru64Xattr,
        StreamId::XaclAixXattr,
        StreamId::XaclOpenbsdXattr,
        StreamId::XaclSolarisSysXattr,
        StreamId::XaclSolarisXattr,
        StreamId::XaclDarwinXattr,
        StreamId::XaclFreebsdXattr,
        StreamId::XaclLinuxXattr,
        StreamId::XaclNetbsdXattr,
        StreamId::XaclPluginAcl,
        StreamId::XaclPluginXattr,
    ];

    #[test]
    fn every_stream_round_trips_through_its_code() {
        for &id in ALL {
            let decoded = StreamId::try_from(id.code()).expect("catalog code decodes");
            assert_eq!(decoded, id);
        }
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<i32> = ALL.iter().map(|id| id.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn legacy_core_values_are_stable() {
        assert_eq!(StreamId::UnixAttributes.code(), 1);
        assert_eq!(StreamId::FileData.code(), 2);
        assert_eq!(StreamId::Md5Digest.code(), 3);
        assert_eq!(StreamId::SparseData.code(), 6);
        assert_eq!(StreamId::SignedDigest.code(), 19);
        assert_eq!(StreamId::EncryptedSessionData.code(), 22);
        assert_eq!(StreamId::CompressedData.code(), 29);
        assert_eq!(StreamId::EncryptedWin32CompressedData.code(), 33);
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(StreamId::try_from(999), Err(UnknownStream(999)));
        assert_eq!(StreamId::try_from(-1), Err(UnknownStream(-1)));
    }

    #[test]
    fn data_family_predicates_are_consistent() {
        for &id in ALL {
            if id.is_gzip() || id.is_block_compressed() {
                assert!(id.is_compressed(), "{id:?}");
                assert!(id.is_data(), "{id:?}");
            }
            if id.is_sparse() {
                assert!(id.is_data(), "{id:?}");
                assert!(!id.is_encrypted(), "sparse streams stay cleartext: {id:?}");
            }
            assert!(
                !(id.is_gzip() && id.is_block_compressed()),
                "compression families are disjoint: {id:?}"
            );
        }
    }

    #[test]
    fn acl_and_xattr_families_are_disjoint() {
        for &id in ALL {
            assert!(!(id.is_acl() && id.is_xattr()), "{id:?}");
        }
    }

    #[test]
    fn encrypted_variants_map_into_encrypted_family() {
        for &id in ALL {
            if let Some(enc) = id.encrypted_variant() {
                assert!(enc.is_encrypted(), "{id:?} -> {enc:?}");
            }
        }
        assert_eq!(
            StreamId::FileData.encrypted_variant(),
            Some(StreamId::EncryptedFileData)
        );
        assert_eq!(StreamId::SparseData.encrypted_variant(), None);
    }

    #[test]
    fn compressed_variants_preserve_sparse_and_layout() {
        assert_eq!(
            StreamId::SparseData.gzip_variant(),
            Some(StreamId::SparseGzipData)
        );
        assert_eq!(
            StreamId::Win32Data.block_compressed_variant(),
            Some(StreamId::Win32CompressedData)
        );
        assert_eq!(StreamId::GzipData.gzip_variant(), None);
    }
}
