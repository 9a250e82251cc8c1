#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `flist` defines the file-entry vocabulary of the backup pipeline and the
//! codecs that move it across the wire: the classification catalog, the
//! per-entry option set, the base64-of-integers stat encoding, the
//! NUL-delimited attribute packet, path stripping, and the data-stream
//! selection table.
//!
//! Traversal policy is deliberately absent. A [`FileSource`] yields entries
//! that have already been classified and decorated with options; this crate
//! only defines what such an entry looks like and how it is encoded.
//!
//! # Invariants
//!
//! - Classification codes and the attribute packet layout are wire-stable.
//! - Stream selection is deterministic from the option tuple; the table in
//!   [`select`] is the single authority for it.

pub mod attr;
pub mod base64;
pub mod entry;
pub mod select;
pub mod stat;
pub mod strip;
pub mod types;

pub use attr::{AttributePacket, AttrError};
pub use entry::{FileEntry, FileSource, SnapshotMapping, VecSource};
pub use select::{select_data_stream, SelectError};
pub use stat::UnixStat;
pub use types::{FileOptions, FileType, UnknownFileType};
