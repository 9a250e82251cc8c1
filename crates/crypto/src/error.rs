//! Error taxonomy of the crypto engine.

/// Errors raised by session handling, cipher contexts, and signatures.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A session or signature blob did not parse.
    #[error("malformed {0} record")]
    Malformed(&'static str),
    /// The blob magic does not name a known record.
    #[error("unknown record magic {0:#x}")]
    BadMagic(u32),
    /// The record version is not supported.
    #[error("unsupported record version {0}")]
    BadVersion(u16),
    /// The session names a cipher this agent does not implement.
    #[error("unsupported cipher on this system (code {0})")]
    UnsupportedCipher(u16),
    /// The session key length does not match the cipher.
    #[error("session key length {got} does not match cipher ({want})")]
    KeyLength {
        /// Length found.
        got: usize,
        /// Length the cipher requires.
        want: usize,
    },
    /// No private key matched any session recipient.
    #[error("missing private key required to decrypt encrypted backup data")]
    NoRecipient,
    /// Unwrapping the session key failed.
    #[error("decrypt of the session key failed")]
    SessionDecrypt,
    /// Wrapping the session key for a recipient failed.
    #[error("an error occurred while encrypting the session for a recipient")]
    SessionEncrypt,
    /// Ciphertext did not end on a padded block boundary.
    #[error("encryption padding error")]
    Padding,
    /// The signature names a digest this agent cannot compute.
    #[error("unsupported digest algorithm in signature")]
    SignatureDigest,
    /// Building the signature failed.
    #[error("an error occurred while signing the stream")]
    Signing,
    /// The signature did not verify against the digest.
    #[error("signature validation failed")]
    BadSignature,
}
