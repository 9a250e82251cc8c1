//! Per-block zlib codec for the gzip data-stream family.
//!
//! The sender keeps one [`BlockDeflater`] per job. Each file may select its
//! own level, and each block is deflated with an end-of-stream flush and the
//! state reset afterwards, so every record on the wire is a complete zlib
//! stream the receiver can inflate in isolation. The receiver keeps one
//! [`BlockInflater`] per job whose scratch buffer grows by half whenever a
//! block inflates larger than expected and then stays grown.

use flate2::{Compress, Decompress, FlushCompress, FlushDecompress, Status};

use crate::level::CompressionLevel;
use crate::max_deflated_len;

/// Error raised by the per-block zlib codec.
#[derive(Debug, thiserror::Error)]
pub enum ZlibError {
    /// The deflate stream reported an error while compressing a block.
    #[error("compression deflate error: {0}")]
    Deflate(String),
    /// The inflate stream reported an error while decompressing a block.
    #[error("uncompression error: {0}")]
    Inflate(String),
}

/// Stateful per-job deflater.
#[derive(Debug)]
pub struct BlockDeflater {
    state: Compress,
    level: CompressionLevel,
}

impl BlockDeflater {
    /// Creates a deflater with the default level.
    #[must_use]
    pub fn new() -> Self {
        Self::with_level(CompressionLevel::Default)
    }

    /// Creates a deflater with an explicit level.
    #[must_use]
    pub fn with_level(level: CompressionLevel) -> Self {
        Self {
            state: Compress::new(level.into(), true),
            level,
        }
    }

    /// Re-parameterises the stream for the next file's level.
    pub fn set_level(&mut self, level: CompressionLevel) {
        if level != self.level {
            self.state = Compress::new(level.into(), true);
            self.level = level;
        }
    }

    /// The currently configured level.
    #[must_use]
    pub const fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Deflates one block into `out`, replacing its contents.
    ///
    /// The stream is flushed to end-of-stream and reset, so `out` holds a
    /// complete zlib stream when this returns.
    pub fn compress_block(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), ZlibError> {
        out.clear();
        out.reserve(max_deflated_len(input.len()));

        let start_in = self.state.total_in();
        loop {
            let consumed = (self.state.total_in() - start_in) as usize;
            let status = self
                .state
                .compress_vec(&input[consumed..], out, FlushCompress::Finish)
                .map_err(|err| ZlibError::Deflate(err.to_string()))?;
            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    let grow = (out.capacity() / 2).max(64);
                    out.reserve(grow);
                }
            }
        }
        self.state.reset();
        Ok(())
    }
}

impl Default for BlockDeflater {
    fn default() -> Self {
        Self::new()
    }
}

/// Stateful per-job inflater with a growable scratch budget.
#[derive(Debug)]
pub struct BlockInflater {
    state: Decompress,
    scratch: usize,
}

impl BlockInflater {
    /// Creates an inflater whose scratch buffer starts at `initial_scratch`
    /// bytes. The job sizes this from its read-block size.
    #[must_use]
    pub fn new(initial_scratch: usize) -> Self {
        Self {
            state: Decompress::new(true),
            scratch: initial_scratch.max(64),
        }
    }

    /// Inflates one complete zlib stream into `out`, replacing its contents.
    pub fn decompress_block(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), ZlibError> {
        out.clear();
        out.reserve(self.scratch);

        let start_in = self.state.total_in();
        loop {
            let consumed = (self.state.total_in() - start_in) as usize;
            let status = self
                .state
                .decompress_vec(&input[consumed..], out, FlushDecompress::Finish)
                .map_err(|err| ZlibError::Inflate(err.to_string()))?;
            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if (self.state.total_in() - start_in) as usize == input.len()
                        && out.len() < out.capacity()
                    {
                        // Input exhausted without reaching end-of-stream.
                        self.state.reset(true);
                        return Err(ZlibError::Inflate("truncated zlib stream".to_owned()));
                    }
                    // The scratch buffer was too small, retry with a bigger one.
                    self.scratch += self.scratch / 2;
                    let grow = self.scratch.saturating_sub(out.capacity()).max(64);
                    out.reserve(grow);
                }
            }
        }
        self.state.reset(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_round_trips() {
        let mut deflater = BlockDeflater::new();
        let mut inflater = BlockInflater::new(1024);
        let input = b"The quick brown fox jumps over the lazy dog".repeat(16);

        let mut compressed = Vec::new();
        deflater
            .compress_block(&input, &mut compressed)
            .expect("deflate block");
        assert!(!compressed.is_empty());
        assert!(compressed.len() < input.len());

        let mut restored = Vec::new();
        inflater
            .decompress_block(&compressed, &mut restored)
            .expect("inflate block");
        assert_eq!(restored, input);
    }

    #[test]
    fn every_block_is_an_independent_stream() {
        let mut deflater = BlockDeflater::new();
        let blocks: [&[u8]; 3] = [b"first block", b"", b"third block with more content"];

        let mut compressed_blocks = Vec::new();
        for block in blocks {
            let mut compressed = Vec::new();
            deflater
                .compress_block(block, &mut compressed)
                .expect("deflate block");
            compressed_blocks.push(compressed);
        }

        // A fresh inflater must be able to open any block on its own.
        for (block, compressed) in blocks.iter().zip(&compressed_blocks) {
            let mut inflater = BlockInflater::new(16);
            let mut restored = Vec::new();
            inflater
                .decompress_block(compressed, &mut restored)
                .expect("inflate block");
            assert_eq!(&restored, block);
        }
    }

    #[test]
    fn level_change_applies_to_subsequent_blocks() {
        let payload = b"AAAAAAAAAA".repeat(200);
        let mut deflater = BlockDeflater::new();

        deflater.set_level(CompressionLevel::from_numeric(1).expect("valid"));
        let mut fast = Vec::new();
        deflater.compress_block(&payload, &mut fast).expect("deflate");

        deflater.set_level(CompressionLevel::Best);
        let mut best = Vec::new();
        deflater.compress_block(&payload, &mut best).expect("deflate");

        assert!(best.len() <= fast.len());
    }

    #[test]
    fn undersized_scratch_grows_until_the_block_fits() {
        let input = vec![7u8; 256 * 1024];
        let mut deflater = BlockDeflater::new();
        let mut compressed = Vec::new();
        deflater
            .compress_block(&input, &mut compressed)
            .expect("deflate block");

        let mut inflater = BlockInflater::new(64);
        let mut restored = Vec::new();
        inflater
            .decompress_block(&compressed, &mut restored)
            .expect("inflate with growth");
        assert_eq!(restored, input);
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut deflater = BlockDeflater::new();
        let mut compressed = Vec::new();
        deflater
            .compress_block(b"some payload to cut short", &mut compressed)
            .expect("deflate block");
        compressed.truncate(compressed.len() / 2);

        let mut inflater = BlockInflater::new(1024);
        let mut restored = Vec::new();
        assert!(inflater
            .decompress_block(&compressed, &mut restored)
            .is_err());
    }

    #[test]
    fn garbage_input_is_rejected() {
        let mut inflater = BlockInflater::new(1024);
        let mut restored = Vec::new();
        assert!(inflater
            .decompress_block(&[0xde, 0xad, 0xbe, 0xef], &mut restored)
            .is_err());
    }

    #[test]
    fn incompressible_data_round_trips() {
        let payload: Vec<u8> = (0..4096u32).map(|i| (i * 137 + 73) as u8).collect();
        let mut deflater = BlockDeflater::new();
        let mut compressed = Vec::new();
        deflater
            .compress_block(&payload, &mut compressed)
            .expect("deflate block");

        let mut inflater = BlockInflater::new(4096);
        let mut restored = Vec::new();
        inflater
            .decompress_block(&compressed, &mut restored)
            .expect("inflate block");
        assert_eq!(restored, payload);
    }
}
