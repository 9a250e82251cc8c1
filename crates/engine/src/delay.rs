//! Holding buffer for metadata records that must be applied late.
//!
//! ACL and xattr records arriving while a regular file restores are not
//! applied immediately: replaying them before the stat tuple would let the
//! attribute replay strip security bits again. They queue here and drain
//! when the file closes, ACLs first, then xattrs, each class in arrival
//! order. Entries never outlive their file.

use protocol::StreamId;

/// FIFO of delayed `(stream, payload)` records for the current file.
#[derive(Debug, Default)]
pub struct DelayQueue {
    items: Vec<(StreamId, Vec<u8>)>,
}

impl DelayQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one record.
    pub fn push(&mut self, stream: StreamId, payload: &[u8]) {
        if payload.is_empty() {
            return;
        }
        self.items.push((stream, payload.to_vec()));
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of queued records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Drains the queue in application order: all ACL records in arrival
    /// order, then all xattr records in arrival order.
    #[must_use]
    pub fn drain_ordered(&mut self) -> Vec<(StreamId, Vec<u8>)> {
        let items = std::mem::take(&mut self.items);
        let (acls, rest): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|(stream, _)| stream.is_acl());
        acls.into_iter().chain(rest).collect()
    }

    /// Discards everything, used when a file is abandoned.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}
