//! Hard-link bookkeeping on the backup side.
//!
//! The first time an inode with multiple links is saved, its file index and
//! finalised digest are recorded here. Every later path to the same inode
//! arrives classified as a hard-link reference: it emits attributes that
//! point at the original's file index and re-sends the original's digest
//! verbatim, never its data.

use std::collections::HashMap;

use protocol::StreamId;

/// What was recorded for the first-seen path of an inode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedFile {
    /// File index the data was saved under.
    pub file_index: u32,
    /// Wire name the data was saved under.
    pub name: String,
    /// Digest record emitted for the data, when one was.
    pub digest: Option<(StreamId, Vec<u8>)>,
}

/// Registry of saved inodes, keyed by `(dev, ino)`.
#[derive(Debug, Default)]
pub struct LinkRegistry {
    saved: HashMap<(u64, u64), LinkedFile>,
}

impl LinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the first-seen path of an inode.
    pub fn record(&mut self, dev: u64, ino: u64, file_index: u32, name: &str) {
        self.saved.entry((dev, ino)).or_insert(LinkedFile {
            file_index,
            name: name.to_owned(),
            digest: None,
        });
    }

    /// Attaches the finalised digest to a recorded inode.
    pub fn set_digest(&mut self, dev: u64, ino: u64, stream: StreamId, digest: &[u8]) {
        if let Some(linked) = self.saved.get_mut(&(dev, ino)) {
            linked.digest = Some((stream, digest.to_vec()));
        }
    }

    /// Looks up the recorded original for an inode.
    #[must_use]
    pub fn lookup(&self, dev: u64, ino: u64) -> Option<&LinkedFile> {
        self.saved.get(&(dev, ino))
    }
}
