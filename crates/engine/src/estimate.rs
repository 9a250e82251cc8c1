//! Estimate mode: tally what a backup would send without sending it.

use std::sync::atomic::Ordering;

use flist::{FileOptions, FileSource, FileType};

use crate::job::JobContext;

/// Totals a backup of the same source would produce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Estimate {
    /// Files that would be catalogued.
    pub files: u32,
    /// Data bytes that would be read.
    pub bytes: u64,
}

/// Walks `source` and tallies files and bytes.
///
/// Uses the same classification routing as the backup pipeline: entries the
/// backup would skip are not counted. Returns `None` when the job is
/// cancelled mid-walk.
pub fn estimate(jcr: &JobContext, source: &mut dyn FileSource) -> Option<Estimate> {
    let mut totals = Estimate::default();

    while let Some(entry) = source.next_entry() {
        if jcr.is_canceled() {
            return None;
        }
        match entry.ftype {
            FileType::HardlinkRef
            | FileType::RegularEmpty
            | FileType::Regular
            | FileType::SymLink
            | FileType::NoRecurseMark
            | FileType::DifferentFSMark
            | FileType::DisallowedFSMark
            | FileType::DisallowedDriveMark
            | FileType::Reparse
            | FileType::Junction
            | FileType::DirEnd
            | FileType::Special
            | FileType::RawDevice
            | FileType::Fifo => {}
            _ => continue,
        }

        if entry.ftype != FileType::HardlinkRef && entry.stat.is_regular() {
            if entry.stat.size > 0 {
                totals.bytes += entry.stat.size as u64;
            }
            if entry.options.contains(FileOptions::HFS_PLUS) {
                if entry.fork_len > 0 {
                    totals.bytes += entry.fork_len as u64;
                }
                totals.bytes += 32;
            }
        }
        jcr.counters.files_examined.fetch_add(1, Ordering::Relaxed);
        totals.files += 1;
    }
    Some(totals)
}
