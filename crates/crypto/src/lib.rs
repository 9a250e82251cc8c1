#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `crypto` implements the encryption stage of the transform chain and the
//! signature records that close a file's record group. A job establishes one
//! [`CryptoSession`]: a randomly generated symmetric key wrapped for each
//! recipient's public key and encoded once, then replayed as the
//! crypto-session record at the start of every encrypted file. Each file
//! allocates a [`CipherContext`] from the session; the restore side holds
//! the matching [`DecipherContext`] plus a [`PacketBuffer`] that reassembles
//! the length-framed packets the sender emitted.
//!
//! # Design
//!
//! The cipher contexts follow block-cipher envelope semantics: `update` may
//! emit fewer bytes than it consumes, retaining the partial block, and
//! `finalize` flushes PKCS#7 padding. The sender frames each plaintext block
//! as `len(u32 BE) | bytes` and encrypts the frame, so the receiver can
//! rebuild the exact block boundaries the backup-side transforms produced
//! regardless of how ciphertext was split across records.
//!
//! # Errors
//!
//! Session and cipher setup failures are job-fatal; per-block cipher update
//! failures are job-fatal; signature verification failures are per-file
//! warnings. The engine maps [`CryptoError`] variants accordingly.

mod cipher_ctx;
mod error;
mod packet;
mod session;
mod sign;

pub use cipher_ctx::{CipherContext, DecipherContext};
pub use error::CryptoError;
pub use packet::{PacketBuffer, CRYPTO_LEN_SIZE};
pub use session::{CipherSpec, CryptoSession, Keypair, RecipientKey, SessionKeys};
pub use sign::SignatureRecord;
