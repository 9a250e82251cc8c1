//! Digest algorithm selectors.

use std::fmt;

/// Digest algorithms the agent can compute and verify.
///
/// The per-file verify digest may use any of these; the job-wide signing
/// digest is one of them for the whole job. Numeric values match the wire
/// encoding used inside signature records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DigestKind {
    /// 128-bit MD5, kept for interoperability with old archives.
    Md5,
    /// 160-bit SHA-1.
    Sha1,
    /// 256-bit SHA-2, the default signing algorithm.
    Sha256,
    /// 512-bit SHA-2.
    Sha512,
}

impl DigestKind {
    /// Length of the finalised digest in bytes.
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// Wire value carried inside signature records.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::Md5 => 1,
            Self::Sha1 => 2,
            Self::Sha256 => 3,
            Self::Sha512 => 4,
        }
    }
}

impl TryFrom<u16> for DigestKind {
    type Error = UnknownDigest;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Md5),
            2 => Ok(Self::Sha1),
            3 => Ok(Self::Sha256),
            4 => Ok(Self::Sha512),
            other => Err(UnknownDigest(other)),
        }
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        };
        f.write_str(name)
    }
}

/// Error returned when a wire value does not name a known digest algorithm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown digest algorithm code {0}")]
pub struct UnknownDigest(pub u16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for kind in [
            DigestKind::Md5,
            DigestKind::Sha1,
            DigestKind::Sha256,
            DigestKind::Sha512,
        ] {
            assert_eq!(DigestKind::try_from(kind.code()).expect("known code"), kind);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(DigestKind::try_from(0), Err(UnknownDigest(0)));
        assert_eq!(DigestKind::try_from(99), Err(UnknownDigest(99)));
    }

    #[test]
    fn digest_lengths_match_algorithms() {
        assert_eq!(DigestKind::Md5.digest_len(), 16);
        assert_eq!(DigestKind::Sha1.digest_len(), 20);
        assert_eq!(DigestKind::Sha256.digest_len(), 32);
        assert_eq!(DigestKind::Sha512.digest_len(), 64);
    }

    #[test]
    fn display_names_are_upper_case() {
        assert_eq!(DigestKind::Sha256.to_string(), "SHA256");
    }
}
