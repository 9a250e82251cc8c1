//! Streaming digest wrapper.
//!
//! Callers feed data incrementally via [`FileDigest::update`] and obtain the
//! final digest through [`FileDigest::finalize`], mirroring how the pipeline
//! hashes each block as it is read. The wrapper erases the concrete hasher
//! type so the engine can hold "whichever digest the file selected" in one
//! field.

use digest::Digest;

use crate::kind::DigestKind;

/// Upper bound on the byte length of any finalised digest.
///
/// Receive-side buffers for digest records are sized from this constant.
pub const CRYPTO_DIGEST_MAX_SIZE: usize = 64;

/// A running digest of one of the supported algorithms.
#[derive(Clone)]
pub enum FileDigest {
    /// Running MD5 state.
    Md5(md5::Md5),
    /// Running SHA-1 state.
    Sha1(sha1::Sha1),
    /// Running SHA-256 state.
    Sha256(sha2::Sha256),
    /// Running SHA-512 state.
    Sha512(sha2::Sha512),
}

impl FileDigest {
    /// Creates a hasher with an empty state for the given algorithm.
    #[must_use]
    pub fn new(kind: DigestKind) -> Self {
        match kind {
            DigestKind::Md5 => Self::Md5(md5::Md5::new()),
            DigestKind::Sha1 => Self::Sha1(sha1::Sha1::new()),
            DigestKind::Sha256 => Self::Sha256(sha2::Sha256::new()),
            DigestKind::Sha512 => Self::Sha512(sha2::Sha512::new()),
        }
    }

    /// The algorithm this hasher runs.
    #[must_use]
    pub const fn kind(&self) -> DigestKind {
        match self {
            Self::Md5(_) => DigestKind::Md5,
            Self::Sha1(_) => DigestKind::Sha1,
            Self::Sha256(_) => DigestKind::Sha256,
            Self::Sha512(_) => DigestKind::Sha512,
        }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(inner) => inner.update(data),
            Self::Sha1(inner) => inner.update(data),
            Self::Sha256(inner) => inner.update(data),
            Self::Sha512(inner) => inner.update(data),
        }
    }

    /// Finalises the digest and returns the resulting bytes.
    #[must_use]
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Self::Md5(inner) => inner.finalize().to_vec(),
            Self::Sha1(inner) => inner.finalize().to_vec(),
            Self::Sha256(inner) => inner.finalize().to_vec(),
            Self::Sha512(inner) => inner.finalize().to_vec(),
        }
    }

    /// Convenience helper that hashes `data` in a single call.
    #[must_use]
    pub fn digest(kind: DigestKind, data: &[u8]) -> Vec<u8> {
        let mut hasher = Self::new(kind);
        hasher.update(data);
        hasher.finalize()
    }
}

impl std::fmt::Debug for FileDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FileDigest").field(&self.kind()).finish()
    }
}
