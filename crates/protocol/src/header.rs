//! ASCII record header codec.
//!
//! A record header is the line `"<file_index> <stream> <length>"` with the
//! three fields printed as decimal integers and separated by single spaces.
//! Data headers carry the expected stream length; attribute and digest
//! headers carry `0`. The header is followed on the wire by `length` payload
//! bytes (re-framed by the peer) and the link's end-of-data marker between
//! logical record groups.

use std::fmt;

use crate::stream::StreamId;

/// Parsed form of a record header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    /// Sender-assigned file index; equals `files_sent` at attribute emission.
    pub file_index: u32,
    /// Raw stream identifier. Kept as `i32` so receivers can dispatch
    /// unknown-but-well-formed streams to their warning path.
    pub stream: i32,
    /// Expected stream length for data headers, `0` otherwise.
    pub length: i64,
}

impl RecordHeader {
    /// Builds a header for a catalog stream.
    #[must_use]
    pub const fn new(file_index: u32, stream: StreamId, length: i64) -> Self {
        Self {
            file_index,
            stream: stream.code(),
            length,
        }
    }

    /// Decodes the catalog stream named by this header, if any.
    pub fn stream_id(&self) -> Result<StreamId, crate::stream::UnknownStream> {
        StreamId::try_from(self.stream)
    }

    /// Parses a header line.
    ///
    /// Trailing NUL or newline terminators are tolerated; anything else after
    /// the third field is an error.
    pub fn parse(line: &str) -> Result<Self, HeaderError> {
        let trimmed = line.trim_end_matches(['\0', '\n']);
        let mut fields = trimmed.split(' ');
        let file_index = fields
            .next()
            .filter(|f| !f.is_empty())
            .and_then(|f| f.parse::<u32>().ok())
            .ok_or_else(|| HeaderError::new(line))?;
        let stream = fields
            .next()
            .and_then(|f| f.parse::<i32>().ok())
            .ok_or_else(|| HeaderError::new(line))?;
        let length = fields
            .next()
            .and_then(|f| f.parse::<i64>().ok())
            .ok_or_else(|| HeaderError::new(line))?;
        if fields.next().is_some() {
            return Err(HeaderError::new(line));
        }
        Ok(Self {
            file_index,
            stream,
            length,
        })
    }

    /// Parses a header transmitted as raw bytes.
    pub fn parse_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        let line = std::str::from_utf8(bytes)
            .map_err(|_| HeaderError::new(String::from_utf8_lossy(bytes)))?;
        Self::parse(line)
    }

    /// Renders the header in wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RecordHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.file_index, self.stream, self.length)
    }
}

/// Error produced by a malformed record header.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("record header scan error: {line:?}")]
pub struct HeaderError {
    line: String,
}

impl HeaderError {
    fn new(line: impl Into<String>) -> Self {
        Self { line: line.into() }
    }
}
