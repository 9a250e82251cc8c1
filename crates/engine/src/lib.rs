#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` drives the two per-file state machines of the agent. The backup
//! pipeline walks a [`flist::FileSource`], classifies each entry, emits its
//! attribute record, runs the transform chain (sparse elision, compression,
//! digest update, cipher) over its data blocks, and closes the record group
//! with fork, metadata, digest, and signature follow-ups. The restore
//! pipeline consumes the same record sequence in any interleaving the backup
//! side may produce, running the inverse chain and replaying metadata after
//! each file closes.
//!
//! # Concurrency
//!
//! One control thread owns a job's pipeline state exclusively. Beside it run
//! the heartbeat monitor (reads counters, emits progress) and, where a write
//! target can block indefinitely, a chunk-writer task fed through a bounded
//! queue. Cancellation is a single flag on [`JobContext`], polled between
//! records, between file phases, and after every block.

mod backup;
mod delay;
mod error;
mod estimate;
mod hardlink;
mod heartbeat;
mod job;
mod portable_filter;
mod restore;
mod worker;

pub use backup::BackupPipeline;
pub use delay::DelayQueue;
pub use error::EngineError;
pub use estimate::{estimate, Estimate};
pub use hardlink::LinkRegistry;
pub use heartbeat::HeartbeatMonitor;
pub use job::{
    JobConfig, JobContext, JobCounters, JobStatus, ProgressSnapshot, ReplaceMode,
};
pub use portable_filter::PortableFilter;
pub use restore::{RestorePipeline, RestoreSummary};
pub use worker::ChunkWriter;
