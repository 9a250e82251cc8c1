#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `checksums` exposes the streaming digests the backup pipeline feeds while
//! reading file data. Two digests run side by side: the per-file verify
//! digest, whose algorithm is selected per file, and the job-wide signing
//! digest that is finalised into a signature record. Both use the same
//! streaming wrapper so higher layers never hard-code algorithm-specific
//! knowledge.
//!
//! # Invariants
//!
//! - A finalised digest never exceeds [`CRYPTO_DIGEST_MAX_SIZE`] bytes;
//!   receive-side buffers are sized from that constant.
//! - [`DigestKind`] is a closed set; unknown algorithms are rejected at the
//!   boundary rather than defaulted.

mod kind;
mod streaming;

pub use kind::{DigestKind, UnknownDigest};
pub use streaming::{FileDigest, CRYPTO_DIGEST_MAX_SIZE};
