//! Data-stream selection.
//!
//! The data-stream identifier is decided once per file from the option
//! tuple, before the attribute record is emitted, and announced inside it.
//! Selection also fixes up incompatible options in place: the surviving
//! flags are what the transform chain actually runs.

use protocol::StreamId;

use crate::entry::FileEntry;
use crate::types::{FileOptions, FileType};

use compress::Algorithm;

/// Error raised when the option tuple maps onto no supported stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid file flags, no supported data stream type")]
pub struct SelectError;

/// Selects the data stream for `entry` and normalises its options.
///
/// `native` is true when the source delivers the OS-native multi-stream
/// layout (the entry's portable flag overrides it). Fixups applied, in
/// order: encryption clears the sparse option (the address prefix must stay
/// in cleartext), the native layout clears sparse, offsets force the sparse
/// stream, encryption is cleared for any stream without an encrypted
/// variant, and compression maps the stream into its compressed family.
pub fn select_data_stream(entry: &mut FileEntry, native: bool) -> Result<StreamId, SelectError> {
    if entry.ftype == FileType::RestoreObject {
        entry.options = FileOptions::empty();
        return Ok(StreamId::FileData);
    }

    if entry.options.contains(FileOptions::ENCRYPT) {
        entry.options.remove(FileOptions::SPARSE);
    }

    let native = native && !entry.options.contains(FileOptions::PORTABLE);
    let mut stream = if native {
        entry.options.remove(FileOptions::SPARSE);
        StreamId::Win32Data
    } else if entry.options.contains(FileOptions::SPARSE) {
        StreamId::SparseData
    } else {
        StreamId::FileData
    };
    if entry.options.contains(FileOptions::OFFSETS) {
        stream = StreamId::SparseData;
    }

    if !matches!(
        stream,
        StreamId::FileData | StreamId::Win32Data | StreamId::MacosForkData
    ) {
        entry.options.remove(FileOptions::ENCRYPT);
    }

    if entry.options.contains(FileOptions::COMPRESS) {
        let algorithm = entry
            .compression
            .map_or(Algorithm::Gzip, |(algorithm, _)| algorithm);
        stream = match algorithm {
            Algorithm::Gzip => stream.gzip_variant().ok_or(SelectError)?,
            Algorithm::Lz4 => stream.block_compressed_variant().ok_or(SelectError)?,
        };
    }

    if entry.options.contains(FileOptions::ENCRYPT) {
        stream = stream.encrypted_variant().ok_or(SelectError)?;
    }

    Ok(stream)
}
