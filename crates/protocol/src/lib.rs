#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `protocol` defines the wire vocabulary shared by the backup and restore
//! pipelines: the closed [`StreamId`] catalog, the ASCII record header, and
//! the [`RecordLink`] seam through which framed records reach the Storage
//! peer. The agent does not frame below this level; flow control, transport
//! compression, and TLS belong to the link implementation.
//!
//! # Design
//!
//! A record group is the ordered sequence of records belonging to a single
//! file: one attributes record, optional crypto-session and data records,
//! optional fork/ACL/xattr follow-ups, and optional digest records, with an
//! end-of-data marker separating logical segments. The sender emits one
//! header per stream segment followed by one payload per block; the Storage
//! peer re-frames so the receiver always observes one header per payload.
//! The in-memory links in [`link`] perform the same re-framing, which lets
//! the two pipelines be tested back to back without a peer.
//!
//! # Invariants
//!
//! - Stream identifiers are wire-stable: the numeric values in [`StreamId`]
//!   are never renumbered.
//! - Record headers are ASCII and self-delimiting; payload bytes are opaque
//!   to this crate.

pub mod header;
pub mod link;
pub mod stream;

pub use header::RecordHeader;
pub use link::{
    CapturedSegment, CapturingLink, LinkError, LinkEvent, ReceivedRecord, RecordLink,
    ReplayLink, SentItem,
};
pub use stream::StreamId;
