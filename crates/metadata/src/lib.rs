#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `metadata` owns everything the pipelines delegate for filesystem
//! metadata: ACL and extended-attribute capture/replay behind the
//! [`MetadataBackend`] trait, and the stat-tuple replay (owner, mode,
//! times) applied when a restored file closes.
//!
//! # Design
//!
//! The backend is one trait with four operations and one implementation per
//! platform family, selected at construction. Backend errors are non-fatal:
//! they are counted per job and logged only while the per-job cap has not
//! been reached, after which they demote to silent counting. The engine
//! reads the final counts for the job report.

#[cfg(unix)]
mod attrs;
mod backend;
mod wire;

#[cfg(all(unix, any(feature = "acl", feature = "xattr")))]
mod unix;

#[cfg(unix)]
pub use attrs::{
    create_device_node, create_fifo, replay_attributes, restore_finder_info,
    verify_restored_size, SizeMismatch,
};
pub use backend::{MetadataBackend, MetadataError, NullBackend, MAX_METADATA_ERRORS_PRINTED};
pub use wire::{
    decode_acl_text, decode_xattr_blob, encode_acl_text, encode_xattr_blob, AclEntryRepr,
    AclKindRepr, WireError, XattrPair,
};

#[cfg(all(unix, any(feature = "acl", feature = "xattr")))]
pub use unix::UnixBackend;
