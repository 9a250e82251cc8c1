//! File entries and the traversal seam.

use std::path::PathBuf;

use checksums::DigestKind;
use compress::{Algorithm, CompressionLevel};

use crate::stat::UnixStat;
use crate::strip::{map_snapshot_path, strip_components};
use crate::types::{FileOptions, FileType};

/// Mapping from a snapshot mount back to the live volume it shadows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotMapping {
    /// Root the traversal actually read from.
    pub snapshot_path: String,
    /// Root the files should be catalogued under.
    pub volume_path: String,
}

/// An already-classified filesystem object produced by a [`FileSource`].
///
/// The traversal layer decides everything policy-shaped before the entry
/// reaches the pipeline: classification, option flags, digest and
/// compression selection, snapshot mapping. The pipeline consumes entries
/// as-is and never re-stats except for the change check.
#[derive(Clone, Debug, PartialEq)]
pub struct FileEntry {
    /// Absolute path the entry is read from.
    pub path: PathBuf,
    /// Classification.
    pub ftype: FileType,
    /// Stat tuple captured at classification time.
    pub stat: UnixStat,
    /// Link target for link-bearing types.
    pub link_target: Option<PathBuf>,
    /// Option flags.
    pub options: FileOptions,
    /// Per-file verify digest selection.
    pub digest: Option<DigestKind>,
    /// Per-file compression selection.
    pub compression: Option<(Algorithm, CompressionLevel)>,
    /// Leading components to strip when [`FileOptions::STRIP_PATH`] is set.
    pub strip_count: u32,
    /// Snapshot-path mapping, when the entry was read from a snapshot.
    pub snapshot: Option<SnapshotMapping>,
    /// Monotonic per-file delta sequence.
    pub delta_seq: u32,
    /// Resource-fork length from extended attributes, zero when absent.
    pub fork_len: i64,
    /// Where the resource fork is read from, when the platform exposes one.
    pub fork_path: Option<PathBuf>,
    /// Finder info blob, when the platform exposes one.
    pub finder_info: Option<[u8; 32]>,
    /// File index of the entry that carried this hard link's data.
    pub link_index: u32,
    /// Errno recorded for the failure classifications.
    pub errno: Option<i32>,
}

impl FileEntry {
    /// Creates a minimal entry of the given classification.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, ftype: FileType, stat: UnixStat) -> Self {
        Self {
            path: path.into(),
            ftype,
            stat,
            link_target: None,
            options: FileOptions::empty(),
            digest: None,
            compression: None,
            strip_count: 0,
            snapshot: None,
            delta_seq: 0,
            fork_len: 0,
            fork_path: None,
            finder_info: None,
            link_index: 0,
            errno: None,
        }
    }

    /// The name to catalogue this entry under: snapshot mapping first, then
    /// component stripping, falling back to the original on either failure.
    #[must_use]
    pub fn wire_name(&self) -> String {
        self.rewrite(&self.path.to_string_lossy())
    }

    /// The link target rewritten with the same rules as the name.
    ///
    /// Symlink targets are never stripped; only hard-link targets are.
    #[must_use]
    pub fn wire_link(&self) -> String {
        match &self.link_target {
            None => String::new(),
            Some(target) => {
                let text = target.to_string_lossy();
                if self.ftype == FileType::SymLink {
                    text.into_owned()
                } else {
                    self.rewrite(&text)
                }
            }
        }
    }

    fn rewrite(&self, name: &str) -> String {
        let mapped = self
            .snapshot
            .as_ref()
            .and_then(|map| map_snapshot_path(name, &map.snapshot_path, &map.volume_path));
        let base = mapped.as_deref().unwrap_or(name);

        if self.options.contains(FileOptions::STRIP_PATH) {
            if let Some(stripped) = strip_components(self.strip_count, base) {
                return stripped;
            }
        }
        base.to_owned()
    }

    /// True when the classification can carry file content.
    #[must_use]
    pub const fn has_file_data(&self) -> bool {
        matches!(
            self.ftype,
            FileType::Regular | FileType::RegularEmpty | FileType::RawDevice
        )
    }
}

/// Yields classified entries in traversal order.
///
/// The pipeline consumes only this iterator; traversal policy, include
/// lists, and snapshot preparation all live behind it.
pub trait FileSource {
    /// Returns the next entry, or `None` at the end of the traversal.
    fn next_entry(&mut self) -> Option<FileEntry>;
}

impl<I> FileSource for I
where
    I: Iterator<Item = FileEntry>,
{
    fn next_entry(&mut self) -> Option<FileEntry> {
        self.next()
    }
}

/// A [`FileSource`] over a prepared list of entries.
#[derive(Debug, Default)]
pub struct VecSource {
    entries: std::vec::IntoIter<FileEntry>,
}

impl VecSource {
    /// Creates a source over `entries`.
    #[must_use]
    pub fn new(entries: Vec<FileEntry>) -> Self {
        Self {
            entries: entries.into_iter(),
        }
    }
}

impl Iterator for VecSource {
    type Item = FileEntry;

    fn next(&mut self) -> Option<FileEntry> {
        self.entries.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(path: &str) -> FileEntry {
        FileEntry::new(
            path,
            FileType::Regular,
            UnixStat {
                mode: 0o100644,
                size: 10,
                ..UnixStat::default()
            },
        )
    }

    #[test]
    fn wire_name_defaults_to_the_path() {
        assert_eq!(regular("/a/b.txt").wire_name(), "/a/b.txt");
    }

    #[test]
    fn wire_name_applies_component_stripping() {
        let mut entry = regular("/backup/stage/etc/hosts");
        entry.options.insert(FileOptions::STRIP_PATH);
        entry.strip_count = 2;
        assert_eq!(entry.wire_name(), "/etc/hosts");
    }

    #[test]
    fn failed_stripping_keeps_the_original_name() {
        let mut entry = regular("/a");
        entry.options.insert(FileOptions::STRIP_PATH);
        entry.strip_count = 3;
        assert_eq!(entry.wire_name(), "/a");
    }

    #[test]
    fn snapshot_mapping_runs_before_stripping() {
        let mut entry = regular("/mnt/.snapshots/job-1/data/file");
        entry.snapshot = Some(SnapshotMapping {
            snapshot_path: "/mnt/.snapshots/job-1".to_owned(),
            volume_path: "/mnt".to_owned(),
        });
        assert_eq!(entry.wire_name(), "/mnt/data/file");

        entry.options.insert(FileOptions::STRIP_PATH);
        entry.strip_count = 1;
        assert_eq!(entry.wire_name(), "/data/file");
    }

    #[test]
    fn symlink_targets_are_never_stripped() {
        let mut entry = regular("/deep/tree/link");
        entry.ftype = FileType::SymLink;
        entry.link_target = Some(PathBuf::from("/deep/tree/target"));
        entry.options.insert(FileOptions::STRIP_PATH);
        entry.strip_count = 1;
        assert_eq!(entry.wire_link(), "/deep/tree/target");
    }

    #[test]
    fn hardlink_targets_are_stripped_with_the_name() {
        let mut entry = regular("/deep/tree/second");
        entry.ftype = FileType::HardlinkRef;
        entry.link_target = Some(PathBuf::from("/deep/tree/first"));
        entry.options.insert(FileOptions::STRIP_PATH);
        entry.strip_count = 1;
        assert_eq!(entry.wire_link(), "/tree/first");
        assert_eq!(entry.wire_name(), "/tree/second");
    }

    #[test]
    fn has_file_data_covers_regular_and_raw_types() {
        assert!(regular("/f").has_file_data());
        let mut entry = regular("/f");
        entry.ftype = FileType::SymLink;
        assert!(!entry.has_file_data());
        entry.ftype = FileType::RawDevice;
        assert!(entry.has_file_data());
    }

    #[test]
    fn vec_source_yields_in_order() {
        let mut source = VecSource::new(vec![regular("/1"), regular("/2")]);
        assert_eq!(source.next_entry().expect("first").path, PathBuf::from("/1"));
        assert_eq!(source.next_entry().expect("second").path, PathBuf::from("/2"));
        assert!(source.next_entry().is_none());
    }
}
