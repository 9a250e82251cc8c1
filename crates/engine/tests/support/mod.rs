//! Shared fixtures for the pipeline tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use engine::{BackupPipeline, JobConfig, JobContext, JobStatus, RestorePipeline, RestoreSummary};
use flist::{FileEntry, FileType, UnixStat, VecSource};
use metadata::NullBackend;
use protocol::{CapturingLink, ReplayLink};

/// Builds a regular-file entry over a real on-disk fixture.
pub fn regular_entry(path: &Path) -> FileEntry {
    let meta = std::fs::symlink_metadata(path).expect("stat fixture");
    FileEntry::new(path, FileType::Regular, UnixStat::from_metadata(&meta))
}

/// Builds an entry with explicit stat fields, for wire-only tests.
pub fn synthetic_entry(path: &str, ftype: FileType, size: i64) -> FileEntry {
    let mode = match ftype {
        FileType::DirEnd | FileType::DirBegin => 0o040755,
        FileType::SymLink => 0o120777,
        FileType::Fifo => 0o010644,
        _ => 0o100644,
    };
    FileEntry::new(
        path,
        ftype,
        UnixStat {
            mode,
            size,
            mtime: 1_700_000_000,
            atime: 1_700_000_000,
            ctime: 1_700_000_000,
            nlink: 1,
            blksize: 4096,
            ..UnixStat::default()
        },
    )
}

/// Runs a backup of `entries` into a capturing link.
pub fn run_backup(config: JobConfig, entries: Vec<FileEntry>) -> (JobStatus, CapturingLink, Arc<JobContext>) {
    let jcr = Arc::new(JobContext::new(config));
    let mut link = CapturingLink::new();
    let mut backend = NullBackend::new();
    let status = {
        let mut pipeline = BackupPipeline::new(Arc::clone(&jcr), &mut link, &mut backend)
            .expect("pipeline setup");
        pipeline.run(&mut VecSource::new(entries))
    };
    (status, link, jcr)
}

/// Replays captured backup traffic through a restore pipeline.
pub fn run_restore(
    config: JobConfig,
    link: CapturingLink,
) -> (JobStatus, RestoreSummary, Arc<JobContext>) {
    let jcr = Arc::new(JobContext::new(config));
    let mut replay: ReplayLink = link.into_replay();
    let mut backend = NullBackend::new();
    let (status, summary) = {
        let mut pipeline = RestorePipeline::new(Arc::clone(&jcr), &mut replay, &mut backend);
        pipeline.run()
    };
    (status, summary, jcr)
}

/// Convenience: full backup of one on-disk tree entry list, restored under
/// `restore_prefix`.
pub fn round_trip(
    mut backup_config: JobConfig,
    mut restore_config: JobConfig,
    entries: Vec<FileEntry>,
    restore_prefix: &Path,
) -> (JobStatus, JobStatus, RestoreSummary) {
    backup_config.restore_prefix = None;
    restore_config.restore_prefix = Some(restore_prefix.to_path_buf());
    let (backup_status, link, _) = run_backup(backup_config, entries);
    let (restore_status, summary, _) = run_restore(restore_config, link);
    (backup_status, restore_status, summary)
}
