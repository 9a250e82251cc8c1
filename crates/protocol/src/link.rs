//! The record-link seam and its in-memory implementations.
//!
//! [`RecordLink`] is the collaborator boundary between the pipelines and the
//! transport. The send half mirrors the sender's cadence: one header per
//! stream segment, one payload per block, an explicit end-of-data marker
//! between logical record groups. The receive half observes the peer's
//! re-framing: one header per payload, so every received record is a
//! `(file_index, stream, payload)` triple.
//!
//! [`CapturingLink`] and [`ReplayLink`] keep the two pipelines testable back
//! to back: the capturing link records what the backup side emits and
//! [`CapturingLink::into_replay`] performs the peer's re-framing so the
//! restore side can consume it.

use std::collections::VecDeque;
use std::io;

use crate::header::RecordHeader;
use crate::stream::StreamId;

/// Transport boundary carrying framed records to and from the Storage peer.
///
/// Errors from this trait are always fatal to the job: the core assumes the
/// link delivers records intact and in order or not at all.
pub trait RecordLink {
    /// Sends a record header.
    fn send_header(&mut self, header: &RecordHeader) -> Result<(), LinkError>;

    /// Sends one payload under the most recent header.
    fn send_payload(&mut self, payload: &[u8]) -> Result<(), LinkError>;

    /// Marks the end of the current logical record group.
    fn signal_eod(&mut self) -> Result<(), LinkError>;

    /// Receives the next link event.
    fn recv(&mut self) -> Result<LinkEvent, LinkError>;
}

/// One event observed on the receive half of a link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// A framed record: header plus its payload bytes.
    Record(ReceivedRecord),
    /// End-of-data marker between record groups.
    EndOfData,
    /// The peer closed the link; no further events follow.
    Closed,
}

/// A received `(file_index, stream, payload)` triple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedRecord {
    /// File index assigned by the sender.
    pub file_index: u32,
    /// Raw stream identifier (may name a stream this agent does not know).
    pub stream: i32,
    /// Payload bytes.
    pub payload: Vec<u8>,
}

/// Errors surfaced by a record link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The link is closed and cannot carry further traffic.
    #[error("record link is closed")]
    Closed,
    /// The transport failed while sending.
    #[error("network send error to storage peer: {0}")]
    Send(#[source] io::Error),
    /// The transport failed while receiving.
    #[error("network receive error from storage peer: {0}")]
    Recv(#[source] io::Error),
    /// The peer violated the record framing.
    #[error("record framing violation: {0}")]
    Framing(String),
}

/// Everything a sender pushed onto a link, in emission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentItem {
    /// A record header.
    Header(RecordHeader),
    /// A payload under the preceding header.
    Payload(Vec<u8>),
    /// An end-of-data marker.
    Eod,
}

/// A captured record group segment: one header and its payloads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapturedSegment {
    /// The header that opened the segment.
    pub header: RecordHeader,
    /// Payloads sent under the header, in order.
    pub payloads: Vec<Vec<u8>>,
}

/// In-memory link that records everything the send half emits.
#[derive(Debug, Default)]
pub struct CapturingLink {
    items: Vec<SentItem>,
}

impl CapturingLink {
    /// Creates an empty capturing link.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw emission sequence.
    #[must_use]
    pub fn items(&self) -> &[SentItem] {
        &self.items
    }

    /// Groups the emission sequence into `(header, payloads)` segments.
    #[must_use]
    pub fn segments(&self) -> Vec<CapturedSegment> {
        let mut segments = Vec::new();
        for item in &self.items {
            match item {
                SentItem::Header(header) => segments.push(CapturedSegment {
                    header: *header,
                    payloads: Vec::new(),
                }),
                SentItem::Payload(payload) => {
                    if let Some(segment) = segments.last_mut() {
                        segment.payloads.push(payload.clone());
                    }
                }
                SentItem::Eod => {}
            }
        }
        segments
    }

    /// Stream identifiers in emission order, one per segment.
    #[must_use]
    pub fn stream_sequence(&self) -> Vec<i32> {
        self.segments().iter().map(|s| s.header.stream).collect()
    }

    /// Number of end-of-data markers emitted.
    #[must_use]
    pub fn eod_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| matches!(item, SentItem::Eod))
            .count()
    }

    /// Re-frames the captured traffic the way the Storage peer would and
    /// returns a link whose receive half replays it: one header per payload,
    /// end-of-data markers preserved.
    #[must_use]
    pub fn into_replay(self) -> ReplayLink {
        let mut events = VecDeque::new();
        let mut current: Option<RecordHeader> = None;
        for item in self.items {
            match item {
                SentItem::Header(header) => current = Some(header),
                SentItem::Payload(payload) => {
                    let header = current.expect("payload sent without a header");
                    events.push_back(LinkEvent::Record(ReceivedRecord {
                        file_index: header.file_index,
                        stream: header.stream,
                        payload,
                    }));
                }
                SentItem::Eod => events.push_back(LinkEvent::EndOfData),
            }
        }
        ReplayLink::new(events)
    }
}

impl RecordLink for CapturingLink {
    fn send_header(&mut self, header: &RecordHeader) -> Result<(), LinkError> {
        // Exercise the wire codec on every send so malformed headers cannot
        // hide behind the in-memory shortcut.
        let reparsed = RecordHeader::parse(&header.encode())
            .map_err(|err| LinkError::Framing(err.to_string()))?;
        self.items.push(SentItem::Header(reparsed));
        Ok(())
    }

    fn send_payload(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        if !matches!(
            self.items.last(),
            Some(SentItem::Header(_) | SentItem::Payload(_))
        ) {
            return Err(LinkError::Framing(
                "payload sent outside a record segment".to_owned(),
            ));
        }
        self.items.push(SentItem::Payload(payload.to_vec()));
        Ok(())
    }

    fn signal_eod(&mut self) -> Result<(), LinkError> {
        self.items.push(SentItem::Eod);
        Ok(())
    }

    fn recv(&mut self) -> Result<LinkEvent, LinkError> {
        Err(LinkError::Framing(
            "capturing link has no receive half".to_owned(),
        ))
    }
}

/// In-memory link whose receive half replays a prepared event sequence.
#[derive(Debug, Default)]
pub struct ReplayLink {
    events: VecDeque<LinkEvent>,
}

impl ReplayLink {
    /// Creates a replay link over the given events.
    #[must_use]
    pub fn new(events: VecDeque<LinkEvent>) -> Self {
        Self { events }
    }

    /// Builds a replay link from `(stream, payload)` records for a single
    /// file index, inserting an end-of-data marker after every record.
    #[must_use]
    pub fn from_records(file_index: u32, records: Vec<(StreamId, Vec<u8>)>) -> Self {
        let mut events = VecDeque::new();
        for (stream, payload) in records {
            events.push_back(LinkEvent::Record(ReceivedRecord {
                file_index,
                stream: stream.code(),
                payload,
            }));
            events.push_back(LinkEvent::EndOfData);
        }
        Self::new(events)
    }

    /// Remaining events not yet received.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl RecordLink for ReplayLink {
    fn send_header(&mut self, _header: &RecordHeader) -> Result<(), LinkError> {
        Err(LinkError::Closed)
    }

    fn send_payload(&mut self, _payload: &[u8]) -> Result<(), LinkError> {
        Err(LinkError::Closed)
    }

    fn signal_eod(&mut self) -> Result<(), LinkError> {
        Err(LinkError::Closed)
    }

    fn recv(&mut self) -> Result<LinkEvent, LinkError> {
        Ok(self.events.pop_front().unwrap_or(LinkEvent::Closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(fi: u32, stream: StreamId, len: i64) -> RecordHeader {
        RecordHeader::new(fi, stream, len)
    }

    #[test]
    fn capturing_link_groups_payloads_under_headers() {
        let mut link = CapturingLink::new();
        link.send_header(&header(1, StreamId::FileData, 12))
            .expect("send header");
        link.send_payload(b"hello ").expect("send payload");
        link.send_payload(b"world!").expect("send payload");
        link.signal_eod().expect("signal eod");

        let segments = link.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].header.stream, StreamId::FileData.code());
        assert_eq!(segments[0].payloads, vec![b"hello ".to_vec(), b"world!".to_vec()]);
        assert_eq!(link.eod_count(), 1);
    }

    #[test]
    fn capturing_link_rejects_orphan_payload() {
        let mut link = CapturingLink::new();
        let err = link.send_payload(b"data").expect_err("no header yet");
        assert!(matches!(err, LinkError::Framing(_)));
    }

    #[test]
    fn capturing_link_rejects_payload_after_eod() {
        let mut link = CapturingLink::new();
        link.send_header(&header(1, StreamId::FileData, 4))
            .expect("send header");
        link.send_payload(b"data").expect("send payload");
        link.signal_eod().expect("signal eod");
        assert!(link.send_payload(b"late").is_err());
    }

    #[test]
    fn replay_reframes_one_header_per_payload() {
        let mut link = CapturingLink::new();
        link.send_header(&header(3, StreamId::SparseData, 8192))
            .expect("send header");
        link.send_payload(b"block-a").expect("send payload");
        link.send_payload(b"block-b").expect("send payload");
        link.signal_eod().expect("signal eod");

        let mut replay = link.into_replay();
        for expected in [b"block-a".as_slice(), b"block-b".as_slice()] {
            match replay.recv().expect("replay event") {
                LinkEvent::Record(record) => {
                    assert_eq!(record.file_index, 3);
                    assert_eq!(record.stream, StreamId::SparseData.code());
                    assert_eq!(record.payload, expected);
                }
                other => panic!("expected record, got {other:?}"),
            }
        }
        assert_eq!(replay.recv().expect("eod"), LinkEvent::EndOfData);
        assert_eq!(replay.recv().expect("closed"), LinkEvent::Closed);
    }

    #[test]
    fn replay_link_is_closed_for_sending() {
        let mut replay = ReplayLink::default();
        assert!(matches!(
            replay.send_header(&header(1, StreamId::FileData, 0)),
            Err(LinkError::Closed)
        ));
        assert!(matches!(replay.signal_eod(), Err(LinkError::Closed)));
    }

    #[test]
    fn drained_replay_reports_closed_forever() {
        let mut replay = ReplayLink::from_records(1, vec![(StreamId::FileData, b"x".to_vec())]);
        assert!(matches!(replay.recv().expect("record"), LinkEvent::Record(_)));
        assert_eq!(replay.recv().expect("eod"), LinkEvent::EndOfData);
        assert_eq!(replay.recv().expect("closed"), LinkEvent::Closed);
        assert_eq!(replay.recv().expect("still closed"), LinkEvent::Closed);
    }
}
