//! Decomposition of native-layout data streams.
//!
//! A native-layout (`WIN32_DATA`-family) stream is a sequence of tagged
//! substreams, each introduced by a 20-byte header: stream id, attributes,
//! payload size, and the length of an optional stream name. A platform
//! without the native restore API extracts only the primary data substream
//! and skips everything else. Headers, names, and payloads may all be split
//! across record boundaries, so the filter keeps its scan state between
//! records.

/// Substream header size without the name.
const STREAM_HEADER_SIZE: usize = 20;

/// Substream id of the primary file data.
const BACKUP_DATA: i32 = 1;

/// Stateful extractor of the primary data substream.
#[derive(Debug, Default)]
pub struct PortableFilter {
    skip: u64,
    data: u64,
    header: [u8; STREAM_HEADER_SIZE],
    header_pos: usize,
}

impl PortableFilter {
    /// Creates a filter at the start of a stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the filter for the next file.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Extracts the next run of primary data from `raw`.
    ///
    /// Consumes from the front of `raw` and returns the next primary-data
    /// slice, or `None` once the record is exhausted. Call repeatedly until
    /// `None`; scan state carries over to the next record.
    pub fn next_data<'a>(&mut self, raw: &mut &'a [u8]) -> Option<&'a [u8]> {
        while !raw.is_empty() {
            if self.skip > 0 {
                let size = (raw.len() as u64).min(self.skip) as usize;
                self.skip -= size as u64;
                *raw = &raw[size..];
                continue;
            }

            if self.data == 0 && !raw.is_empty() {
                // Assemble the next substream header, possibly across
                // record boundaries.
                let size = (STREAM_HEADER_SIZE - self.header_pos).min(raw.len());
                self.header[self.header_pos..self.header_pos + size]
                    .copy_from_slice(&raw[..size]);
                self.header_pos += size;
                *raw = &raw[size..];
                if self.header_pos < STREAM_HEADER_SIZE {
                    return None;
                }
                self.header_pos = 0;

                let stream_id =
                    i32::from_le_bytes([self.header[0], self.header[1], self.header[2], self.header[3]]);
                let payload_size = u64::from_le_bytes([
                    self.header[8],
                    self.header[9],
                    self.header[10],
                    self.header[11],
                    self.header[12],
                    self.header[13],
                    self.header[14],
                    self.header[15],
                ]);
                let name_size = u32::from_le_bytes([
                    self.header[16],
                    self.header[17],
                    self.header[18],
                    self.header[19],
                ]);

                self.skip = u64::from(name_size);
                if stream_id == BACKUP_DATA {
                    self.data = payload_size;
                } else {
                    self.skip += payload_size;
                }
                continue;
            }

            if self.data > 0 {
                let size = (raw.len() as u64).min(self.data) as usize;
                self.data -= size as u64;
                let (data, rest) = raw.split_at(size);
                *raw = rest;
                return Some(data);
            }
        }
        None
    }
}
