//! Encrypted and signed round trips through both pipelines.

mod support;

use checksums::DigestKind;
use engine::{JobConfig, JobStatus};
use flist::FileOptions;
use protocol::StreamId;
use rand::SeedableRng;
use support::{regular_entry, round_trip, run_backup};

fn keyed_configs() -> (JobConfig, JobConfig) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    let keypair = crypto::Keypair::generate(1024, &mut rng).expect("generate test keypair");

    let backup = JobConfig {
        encrypt: true,
        sign: true,
        recipients: vec![keypair.as_recipient()],
        keypair: Some(keypair.clone()),
        ..JobConfig::default()
    };
    let restore = JobConfig {
        sign: true,
        keypair: Some(keypair),
        ..JobConfig::default()
    };
    (backup, restore)
}

fn pseudo_random_bytes(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 32) as u8
        })
        .collect()
}

/// Encrypt + gzip: the record group runs attributes, session data, one or
/// more encrypted-gzip records, the signature, and the digest.
#[test]
fn encrypted_gzip_file_emits_the_expected_group() {
    let src = tempfile::tempdir().expect("create tempdir");
    let path = src.path().join("p.txt");
    std::fs::write(&path, pseudo_random_bytes(10 * 1024)).expect("write fixture");

    let (backup_config, _) = keyed_configs();
    let mut entry = regular_entry(&path);
    entry.options = FileOptions::COMPRESS;
    entry.digest = Some(DigestKind::Sha256);

    let (status, link, _) = run_backup(backup_config, vec![entry]);
    assert_eq!(status, JobStatus::Terminated);

    let codes: Vec<i32> = link.segments().iter().map(|s| s.header.stream).collect();
    assert_eq!(codes[0], StreamId::UnixAttributes.code());
    assert_eq!(codes[1], StreamId::EncryptedSessionData.code());
    assert_eq!(codes[2], StreamId::EncryptedFileGzipData.code());
    assert_eq!(codes[codes.len() - 2], StreamId::SignedDigest.code());
    assert_eq!(codes[codes.len() - 1], StreamId::Sha256Digest.code());

    // Ciphertext is block-aligned and nothing leaks in cleartext.
    let data_segment = &link.segments()[2];
    let total: usize = data_segment.payloads.iter().map(Vec::len).sum();
    assert_eq!(total % 16, 0);
}

/// Decrypt + gunzip of the round-tripped stream restores the exact bytes
/// and verifies the signature.
#[test]
fn encrypted_gzip_round_trip_restores_exact_bytes() {
    let src = tempfile::tempdir().expect("create tempdir");
    let dst = tempfile::tempdir().expect("create tempdir");
    let path = src.path().join("p.txt");
    let contents = pseudo_random_bytes(10 * 1024);
    std::fs::write(&path, &contents).expect("write fixture");

    let (backup_config, restore_config) = keyed_configs();
    let mut entry = regular_entry(&path);
    entry.options = FileOptions::COMPRESS;
    entry.digest = Some(DigestKind::Sha256);

    let (_, restore_status, summary) =
        round_trip(backup_config, restore_config, vec![entry], dst.path());
    assert_eq!(restore_status, JobStatus::Terminated);
    assert_eq!(summary.non_supported_crypto, 0);

    let restored = dst
        .path()
        .join(path.to_str().expect("utf8").trim_start_matches('/'));
    assert_eq!(std::fs::read(&restored).expect("read restored file"), contents);
}

/// Plain encryption without compression round trips across block-unaligned
/// sizes.
#[test]
fn encrypted_unaligned_file_round_trips() {
    let src = tempfile::tempdir().expect("create tempdir");
    let dst = tempfile::tempdir().expect("create tempdir");
    let path = src.path().join("odd");
    let contents = pseudo_random_bytes(3 * 1024 + 7);
    std::fs::write(&path, &contents).expect("write fixture");

    let (backup_config, restore_config) = keyed_configs();
    let entry = regular_entry(&path);

    let (backup_status, restore_status, _) =
        round_trip(backup_config, restore_config, vec![entry], dst.path());
    assert_eq!(backup_status, JobStatus::Terminated);
    assert_eq!(restore_status, JobStatus::Terminated);

    let restored = dst
        .path()
        .join(path.to_str().expect("utf8").trim_start_matches('/'));
    assert_eq!(std::fs::read(&restored).expect("read restored file"), contents);
}

/// A restore without the private key abandons the encrypted file but keeps
/// running.
#[test]
fn missing_private_key_is_counted_not_fatal() {
    let src = tempfile::tempdir().expect("create tempdir");
    let dst = tempfile::tempdir().expect("create tempdir");
    let path = src.path().join("secret");
    std::fs::write(&path, b"cannot be restored without keys").expect("write fixture");

    let (backup_config, _) = keyed_configs();
    let restore_config = JobConfig {
        restore_prefix: Some(dst.path().to_path_buf()),
        ..JobConfig::default()
    };

    let (_, link, _) = run_backup(backup_config, vec![regular_entry(&path)]);
    let (status, _, jcr) = support::run_restore(restore_config, link);

    // The job finishes with warnings; the file carries no plaintext.
    assert_eq!(status, JobStatus::Warnings);
    assert!(jcr.errors() > 0);
    let restored = dst
        .path()
        .join(path.to_str().expect("utf8").trim_start_matches('/'));
    let restored_len = std::fs::metadata(&restored).map(|m| m.len()).unwrap_or(0);
    assert_eq!(restored_len, 0, "no plaintext may be written");
}

/// Encrypted + block-compressed data round trips as well.
#[test]
fn encrypted_block_compressed_round_trips() {
    let src = tempfile::tempdir().expect("create tempdir");
    let dst = tempfile::tempdir().expect("create tempdir");
    let path = src.path().join("lz");
    let contents = b"pattern pattern pattern ".repeat(600);
    std::fs::write(&path, &contents).expect("write fixture");

    let (backup_config, restore_config) = keyed_configs();
    let mut entry = regular_entry(&path);
    entry.options = FileOptions::COMPRESS;
    entry.compression = Some((
        compress::Algorithm::Lz4,
        compress::CompressionLevel::Default,
    ));

    let (_, link, _) = run_backup(backup_config, vec![entry]);
    assert_eq!(
        link.segments()[2].header.stream,
        StreamId::EncryptedFileCompressedData.code()
    );

    let (status, _, _) = support::run_restore(
        JobConfig {
            restore_prefix: Some(dst.path().to_path_buf()),
            ..restore_config
        },
        link,
    );
    assert_eq!(status, JobStatus::Terminated);

    let restored = dst
        .path()
        .join(path.to_str().expect("utf8").trim_start_matches('/'));
    assert_eq!(std::fs::read(&restored).expect("read restored file"), contents);
}
