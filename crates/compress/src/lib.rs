#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `compress` implements the two compression stages of the per-block
//! transform chain. The gzip path runs a stateful zlib deflate stream that
//! is re-parameterised per file and finished-and-reset for every block, so
//! each emitted record is an independently decompressible zlib stream. The
//! framed path compresses each block in one shot and prepends a 12-byte
//! compression header that the restore side validates before inflating.
//!
//! # Design
//!
//! Encoders and decoders never allocate internal output buffers: callers
//! provide scratch vectors that are reused across blocks, mirroring the
//! job-lifetime compression workset of the wire peers. Restore-side inflate
//! buffers grow by half when undersized and keep their size for subsequent
//! blocks.
//!
//! # Errors
//!
//! Compression failures during backup are job-fatal; decompression failures
//! during restore abandon the current file. Both surface as [`zlib::ZlibError`]
//! or [`frame::FrameError`] and are mapped by the engine.

pub mod frame;
pub mod level;
pub mod zlib;

pub use frame::{FrameError, FramedBlockCodec, FRAME_HEADER_LEN, FRAME_MAGIC, FRAME_VERSION};
pub use level::{CompressionLevel, CompressionLevelError};
pub use zlib::{BlockDeflater, BlockInflater, ZlibError};

/// Compression algorithm selected per file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    /// zlib deflate, emitted on the `GZIP_DATA` stream family.
    Gzip,
    /// Framed one-shot block compression, emitted on the `COMPRESSED_DATA`
    /// stream family.
    Lz4,
}

/// Worst-case zlib output for a block of `input_len` bytes.
///
/// Matches the sender's job-lifetime buffer sizing: 0.1% overhead plus 30
/// bytes of stream framing slack.
#[must_use]
pub const fn max_deflated_len(input_len: usize) -> usize {
    input_len + (input_len + 999) / 1000 + 30
}
