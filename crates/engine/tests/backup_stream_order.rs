//! Wire-level checks of the backup side: record ordering, counters, and the
//! hard-link digest re-send.

mod support;

use std::sync::atomic::Ordering;

use checksums::DigestKind;
use engine::JobConfig;
use engine::JobStatus;
use flist::{FileOptions, FileType};
use protocol::{CapturedSegment, StreamId};
use support::{regular_entry, run_backup, synthetic_entry};

fn stream_codes(segments: &[CapturedSegment]) -> Vec<i32> {
    segments.iter().map(|s| s.header.stream).collect()
}

/// A plain regular file produces exactly: attributes, one data record, and
/// the end-of-data markers around them.
#[test]
fn plain_regular_file_emits_attributes_then_data() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("b.txt");
    std::fs::write(&path, b"hello\n").expect("write fixture");

    let (status, link, jcr) = run_backup(JobConfig::default(), vec![regular_entry(&path)]);
    assert_eq!(status, JobStatus::Terminated);

    let segments = link.segments();
    assert_eq!(
        stream_codes(&segments),
        vec![StreamId::UnixAttributes.code(), StreamId::FileData.code()]
    );

    // Attribute record: one payload carrying the packet.
    assert_eq!(segments[0].payloads.len(), 1);
    let attr_payload = &segments[0].payloads[0];
    assert!(attr_payload.starts_with(b"1 3 "));
    let name_end = attr_payload
        .iter()
        .position(|&b| b == 0)
        .expect("NUL after name");
    assert!(attr_payload[..name_end].ends_with(b"b.txt"));

    // Data record: announced length and the exact bytes.
    assert_eq!(segments[1].header.file_index, 1);
    assert_eq!(segments[1].header.length, 6);
    assert_eq!(segments[1].payloads, vec![b"hello\n".to_vec()]);

    // Counters per the data phase only.
    assert_eq!(jcr.counters.files_sent.load(Ordering::Relaxed), 1);
    assert_eq!(jcr.counters.bytes_sent.load(Ordering::Relaxed), 6);
    assert_eq!(jcr.counters.job_errors.load(Ordering::Relaxed), 0);

    // One end-of-data per record group segment plus the job terminator.
    assert_eq!(link.eod_count(), 3);
}

#[test]
fn empty_regular_file_emits_attributes_only() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("empty");
    std::fs::write(&path, b"").expect("write fixture");

    let mut entry = regular_entry(&path);
    entry.ftype = FileType::RegularEmpty;
    let (status, link, _) = run_backup(JobConfig::default(), vec![entry]);
    assert_eq!(status, JobStatus::Terminated);
    assert_eq!(
        stream_codes(&link.segments()),
        vec![StreamId::UnixAttributes.code()]
    );
}

#[test]
fn symlink_emits_attributes_with_target() {
    let mut entry = synthetic_entry("/tree/link", FileType::SymLink, 0);
    entry.link_target = Some("/tree/target".into());

    let (status, link, _) = run_backup(JobConfig::default(), vec![entry]);
    assert_eq!(status, JobStatus::Terminated);

    let segments = link.segments();
    assert_eq!(segments.len(), 1);
    let payload = String::from_utf8(segments[0].payloads[0].clone()).expect("utf8 packet");
    let fields: Vec<&str> = payload.split('\0').collect();
    assert_eq!(fields[2], "/tree/target");
}

#[test]
fn directory_entries_carry_a_trailing_slash() {
    let entry = synthetic_entry("/tree/dir", FileType::DirEnd, 0);
    let (_, link, _) = run_backup(JobConfig::default(), vec![entry]);
    let segments = link.segments();
    let payload = String::from_utf8(segments[0].payloads[0].clone()).expect("utf8 packet");
    assert!(payload.split('\0').next().expect("prefix").ends_with("/tree/dir/"));
}

/// Under the native layout, directory-family entries run a data phase so
/// their OS-native streams are preserved; the announced data stream and the
/// emitted segment agree.
#[test]
fn native_layout_directory_entries_run_a_data_phase() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("junction");
    std::fs::write(&path, b"native stream image").expect("write fixture");

    // The source hands us the native multi-stream image to read; the entry
    // itself is classified as a junction.
    let mut entry = regular_entry(&path);
    entry.ftype = FileType::Junction;
    entry.stat.mode = 0o040755;

    let config = JobConfig {
        native_layout: true,
        ..JobConfig::default()
    };
    let (status, link, jcr) = run_backup(config, vec![entry]);
    assert_eq!(status, JobStatus::Terminated);
    assert_eq!(jcr.counters.job_errors.load(Ordering::Relaxed), 0);

    let segments = link.segments();
    assert_eq!(
        stream_codes(&segments),
        vec![StreamId::UnixAttributes.code(), StreamId::Win32Data.code()]
    );
    assert_eq!(
        segments[1].payloads,
        vec![b"native stream image".to_vec()]
    );

    // The attribute packet announces the same data stream that follows it.
    let attr = flist::AttributePacket::parse(&segments[0].payloads[0]).expect("parse packet");
    assert_eq!(attr.decoded.data_stream, StreamId::Win32Data.code());
}

/// Failure classifications are logged and counted, never sent.
#[test]
fn failure_classifications_count_errors_and_emit_nothing() {
    let entries = vec![
        synthetic_entry("/gone", FileType::NotAccessible, 0),
        synthetic_entry("/nostat", FileType::StatFailed, 0),
        synthetic_entry("/badlink", FileType::FollowFailed, 0),
    ];
    let (status, link, jcr) = run_backup(JobConfig::default(), entries);
    assert_eq!(status, JobStatus::Warnings);
    assert!(link.segments().is_empty());
    assert_eq!(jcr.counters.job_errors.load(Ordering::Relaxed), 3);
    assert_eq!(jcr.counters.files_examined.load(Ordering::Relaxed), 3);
}

#[test]
fn skip_classifications_are_silent() {
    let entries = vec![
        synthetic_entry("/unchanged", FileType::UnchangedSkip, 10),
        synthetic_entry("/archive", FileType::ArchiveSkip, 10),
        synthetic_entry("/walkin", FileType::DirBegin, 0),
    ];
    let (status, link, jcr) = run_backup(JobConfig::default(), entries);
    assert_eq!(status, JobStatus::Terminated);
    assert!(link.segments().is_empty());
    assert_eq!(jcr.counters.job_errors.load(Ordering::Relaxed), 0);
    // DirBegin corrects the examined count back down.
    assert_eq!(jcr.counters.files_examined.load(Ordering::Relaxed), 2);
}

/// A socket special file is skipped with a message, not an error.
#[test]
fn sockets_are_skipped() {
    let mut entry = synthetic_entry("/sock", FileType::Special, 0);
    entry.stat.mode = 0o140644;
    let (status, link, jcr) = run_backup(JobConfig::default(), vec![entry]);
    assert_eq!(status, JobStatus::Terminated);
    assert!(link.segments().is_empty());
    assert_eq!(jcr.counters.job_errors.load(Ordering::Relaxed), 0);
}

/// File indexes are strictly increasing and equal the post-increment value
/// of the files-sent counter.
#[test]
fn file_indexes_are_strictly_increasing() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let mut entries = Vec::new();
    for index in 0..5 {
        let path = dir.path().join(format!("f{index}"));
        std::fs::write(&path, b"data").expect("write fixture");
        entries.push(regular_entry(&path));
    }

    let (_, link, jcr) = run_backup(JobConfig::default(), entries);
    let attr_indexes: Vec<u32> = link
        .segments()
        .iter()
        .filter(|s| s.header.stream == StreamId::UnixAttributes.code())
        .map(|s| s.header.file_index)
        .collect();
    assert_eq!(attr_indexes, vec![1, 2, 3, 4, 5]);
    assert_eq!(jcr.counters.files_sent.load(Ordering::Relaxed), 5);
}

/// The second path to a hard-linked inode emits no data and re-sends the
/// digest recorded for the first path.
#[test]
fn hardlink_reference_resends_the_original_digest() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("x");
    std::fs::write(&path, b"linked contents").expect("write fixture");

    let mut first = regular_entry(&path);
    first.stat.nlink = 2;
    first.digest = Some(DigestKind::Md5);

    let mut second = synthetic_entry(dir.path().join("y").to_str().expect("utf8"), FileType::HardlinkRef, 15);
    second.stat.dev = first.stat.dev;
    second.stat.ino = first.stat.ino;
    second.stat.nlink = 2;
    second.link_target = Some(path.clone());
    second.digest = Some(DigestKind::Md5);

    let (status, link, _) = run_backup(JobConfig::default(), vec![first, second]);
    assert_eq!(status, JobStatus::Terminated);

    let segments = link.segments();
    let codes = stream_codes(&segments);
    assert_eq!(
        codes,
        vec![
            StreamId::UnixAttributes.code(),
            StreamId::FileData.code(),
            StreamId::Md5Digest.code(),
            StreamId::UnixAttributes.code(),
            StreamId::Md5Digest.code(),
        ]
    );

    // Same digest bytes on both records.
    assert_eq!(segments[2].payloads, segments[4].payloads);

    // The reference's attribute record points at the original's index.
    let attr = flist::AttributePacket::parse(&segments[3].payloads[0]).expect("parse packet");
    assert_eq!(attr.ftype, FileType::HardlinkRef);
    assert_eq!(attr.decoded.link_index, 1);
}

/// Cancellation before the traversal starts emits nothing and reports the
/// canceled status.
#[test]
fn cancellation_stops_the_job_before_any_record() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("f");
    std::fs::write(&path, b"data").expect("write fixture");

    let jcr = std::sync::Arc::new(engine::JobContext::new(JobConfig::default()));
    jcr.cancel();
    let mut link = protocol::CapturingLink::new();
    let mut backend = metadata::NullBackend::new();
    let status = {
        let mut pipeline =
            engine::BackupPipeline::new(std::sync::Arc::clone(&jcr), &mut link, &mut backend)
                .expect("pipeline setup");
        pipeline.run(&mut flist::VecSource::new(vec![regular_entry(&path)]))
    };
    assert_eq!(status, JobStatus::Canceled);
    assert!(link.items().is_empty());
}

/// Every emitted record-group sequence is a valid topological extension of
/// the per-file partial order.
#[test]
fn stream_sequences_respect_the_record_group_order() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("data");
    std::fs::write(&path, vec![0x5au8; 9000]).expect("write fixture");

    let combos: Vec<FileOptions> = vec![
        FileOptions::empty(),
        FileOptions::SPARSE,
        FileOptions::OFFSETS,
        FileOptions::COMPRESS,
        FileOptions::SPARSE.with(FileOptions::COMPRESS),
    ];

    for options in combos {
        let mut entry = regular_entry(&path);
        entry.options = options;
        entry.digest = Some(DigestKind::Sha256);
        let (status, link, _) = run_backup(JobConfig::default(), vec![entry.clone()]);
        assert_eq!(status, JobStatus::Terminated, "{options:?}");

        let segments = link.segments();
        assert!(
            segments[0].header.stream == StreamId::UnixAttributes.code(),
            "attributes first for {options:?}"
        );

        // One data stream, deterministic from the option tuple.
        let mut probe = entry;
        let expected =
            flist::select_data_stream(&mut probe, false).expect("selectable");
        assert_eq!(segments[1].header.stream, expected.code(), "{options:?}");

        // Digest record closes the group.
        let last = segments.last().expect("at least one segment");
        assert_eq!(last.header.stream, StreamId::Sha256Digest.code());
    }
}

/// The announced data stream inside the attribute packet matches the stream
/// the data was actually sent on.
#[test]
fn announced_data_stream_matches_emission() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let path = dir.path().join("z");
    std::fs::write(&path, vec![7u8; 5000]).expect("write fixture");

    let mut entry = regular_entry(&path);
    entry.options = FileOptions::COMPRESS;
    let (_, link, _) = run_backup(JobConfig::default(), vec![entry]);

    let segments = link.segments();
    let attr = flist::AttributePacket::parse(&segments[0].payloads[0]).expect("parse packet");
    assert_eq!(attr.decoded.data_stream, StreamId::GzipData.code());
    assert_eq!(segments[1].header.stream, StreamId::GzipData.code());
}
