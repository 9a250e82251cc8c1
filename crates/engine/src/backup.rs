//! The per-file backup state machine.
//!
//! For each entry: classify, emit the attribute record, then for entries
//! with data run the transform chain over every block read from the source
//! (sparse elision, compression, digest update, cipher) and close the
//! record group with fork, metadata, digest, and signature follow-ups.
//! Cancellation is polled per entry, per block, and between phases;
//! file-scoped failures are counted and the traversal continues.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use checksums::{DigestKind, FileDigest};
use compress::{Algorithm, BlockDeflater, CompressionLevel, FramedBlockCodec};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use crypto::{CipherContext, CryptoSession};
use flist::base64::to_base64;
use flist::{
    select_data_stream, AttributePacket, FileEntry, FileOptions, FileSource, FileType,
};
use metadata::{MetadataBackend, MetadataError};
use protocol::{RecordHeader, RecordLink, StreamId};
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::hardlink::LinkRegistry;
use crate::job::{JobContext, JobStatus};

/// Size of the file-address prefix on sparse/offset blocks.
pub(crate) const ADDR_HEADER: usize = 8;

pub(crate) fn digest_stream(kind: DigestKind) -> StreamId {
    match kind {
        DigestKind::Md5 => StreamId::Md5Digest,
        DigestKind::Sha1 => StreamId::Sha1Digest,
        DigestKind::Sha256 => StreamId::Sha256Digest,
        DigestKind::Sha512 => StreamId::Sha512Digest,
    }
}

fn is_all_zero(block: &[u8]) -> bool {
    block.iter().all(|&byte| byte == 0)
}

/// Reads as much of `buf` as the source can fill, stopping at end of file.
fn read_full(source: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match source.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(read) => total += read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(total)
}

/// Where data blocks come from: a plain file, or a watchdog-guarded reader
/// for FIFO sources whose open and reads can stall indefinitely.
enum BlockSource {
    File(File),
    Watchdog {
        rx: Receiver<std::io::Result<Vec<u8>>>,
        timeout: Duration,
    },
}

impl BlockSource {
    fn open(path: &Path, no_atime: bool) -> std::io::Result<Self> {
        let mut options = std::fs::OpenOptions::new();
        options.read(true);
        #[cfg(target_os = "linux")]
        if no_atime {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NOATIME);
        }
        #[cfg(not(target_os = "linux"))]
        let _ = no_atime;
        match options.open(path) {
            Ok(file) => Ok(Self::File(file)),
            #[cfg(target_os = "linux")]
            Err(err) if err.raw_os_error() == Some(libc::EPERM) && no_atime => {
                // O_NOATIME needs ownership; retry without it.
                Ok(Self::File(File::open(path)?))
            }
            Err(err) => Err(err),
        }
    }

    fn open_fifo(path: &Path, block_size: usize, timeout: Duration) -> Self {
        let (tx, rx) = bounded::<std::io::Result<Vec<u8>>>(2);
        let path = path.to_path_buf();
        std::thread::spawn(move || {
            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(err) => {
                    let _ = tx.send(Err(err));
                    return;
                }
            };
            loop {
                let mut buf = vec![0u8; block_size];
                match read_full(&mut file, &mut buf) {
                    Ok(0) => break,
                    Ok(read) => {
                        buf.truncate(read);
                        if tx.send(Ok(buf)).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            }
        });
        Self::Watchdog { rx, timeout }
    }

    fn read_block(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::File(file) => read_full(file, buf),
            Self::Watchdog { rx, timeout } => match rx.recv_timeout(*timeout) {
                Ok(Ok(chunk)) => {
                    let len = chunk.len().min(buf.len());
                    buf[..len].copy_from_slice(&chunk[..len]);
                    Ok(len)
                }
                Ok(Err(err)) => Err(err),
                Err(RecvTimeoutError::Timeout) => Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "FIFO read stalled",
                )),
                Err(RecvTimeoutError::Disconnected) => Ok(0),
            },
        }
    }
}

/// The send-side pipeline for one job.
pub struct BackupPipeline<'a, L, B>
where
    L: RecordLink,
    B: MetadataBackend,
{
    jcr: Arc<JobContext>,
    link: &'a mut L,
    backend: &'a mut B,
    session: Option<CryptoSession>,
    deflater: BlockDeflater,
    registry: LinkRegistry,
}

impl<'a, L, B> BackupPipeline<'a, L, B>
where
    L: RecordLink,
    B: MetadataBackend,
{
    /// Sets up the per-job state: the compression workset and, when the job
    /// encrypts, the crypto session wrapped for every recipient.
    pub fn new(
        jcr: Arc<JobContext>,
        link: &'a mut L,
        backend: &'a mut B,
    ) -> Result<Self, EngineError> {
        let session = if jcr.config.encrypt {
            if jcr.config.recipients.is_empty() {
                return Err(EngineError::NoRecipients);
            }
            let mut rng = rand::rngs::OsRng;
            Some(CryptoSession::generate(
                jcr.config.cipher,
                &jcr.config.recipients,
                &mut rng,
            )?)
        } else {
            None
        };

        Ok(Self {
            jcr,
            link,
            backend,
            session,
            deflater: BlockDeflater::new(),
            registry: LinkRegistry::new(),
        })
    }

    /// Runs the traversal to completion and resolves the job status.
    pub fn run(&mut self, source: &mut dyn FileSource) -> JobStatus {
        match self.blast(source) {
            Ok(()) => self.jcr.finish_status(),
            Err(EngineError::Canceled) => JobStatus::Canceled,
            Err(EngineError::Link(err)) => {
                if !self.jcr.is_canceled() {
                    error!(%err, "network send error to storage peer");
                }
                JobStatus::FatalError
            }
            Err(err) => {
                error!(%err, "backup terminated");
                JobStatus::ErrorTerminated
            }
        }
    }

    fn blast(&mut self, source: &mut dyn FileSource) -> Result<(), EngineError> {
        while let Some(mut entry) = source.next_entry() {
            if self.jcr.is_canceled() {
                return Err(EngineError::Canceled);
            }
            self.save_file(&mut entry)?;
        }

        if self.backend.acl_errors() > 0 {
            warn!(
                errors = self.backend.acl_errors(),
                "had acl errors while doing backup"
            );
        }
        if self.backend.xattr_errors() > 0 {
            warn!(
                errors = self.backend.xattr_errors(),
                "had xattr errors while doing backup"
            );
        }

        self.link.signal_eod()?;
        Ok(())
    }

    /// Handles one classified entry end to end.
    fn save_file(&mut self, entry: &mut FileEntry) -> Result<(), EngineError> {
        self.jcr.counters.files_examined.fetch_add(1, Ordering::Relaxed);

        match entry.ftype {
            FileType::DirBegin => {
                self.jcr.counters.files_examined.fetch_sub(1, Ordering::Relaxed);
                return Ok(());
            }
            FileType::NoRecurseMark => {
                info!(path = %entry.path.display(), "recursion turned off, not descending");
                entry.ftype = FileType::DirEnd;
            }
            FileType::DifferentFSMark => {
                info!(path = %entry.path.display(), "different filesystem, not descending");
                entry.ftype = FileType::DirEnd;
            }
            FileType::DisallowedFSMark => {
                info!(path = %entry.path.display(), "disallowed filesystem, not descending");
                entry.ftype = FileType::DirEnd;
            }
            FileType::DisallowedDriveMark => {
                info!(path = %entry.path.display(), "disallowed drive type, not descending");
            }
            FileType::Special if entry.stat.is_socket() => {
                info!(path = %entry.path.display(), "socket file skipped");
                return Ok(());
            }
            FileType::NotAccessible
            | FileType::FollowFailed
            | FileType::StatFailed
            | FileType::OpenFailed => {
                warn!(
                    path = %entry.path.display(),
                    errno = entry.errno.unwrap_or(0),
                    "could not access, not saved"
                );
                self.count_file_error()?;
                return Ok(());
            }
            FileType::UnchangedSkip => {
                debug!(path = %entry.path.display(), "unchanged file skipped");
                return Ok(());
            }
            FileType::ArchiveSkip => {
                info!(path = %entry.path.display(), "archive file not saved");
                return Ok(());
            }
            _ => {}
        }

        let has_data = entry.has_file_data();

        let mut digest = if has_data {
            entry.digest.map(FileDigest::new)
        } else {
            None
        };
        let mut signing = if has_data && self.jcr.config.sign && self.jcr.config.keypair.is_some()
        {
            Some(FileDigest::new(self.jcr.config.signing_digest))
        } else {
            None
        };
        if has_data && self.session.is_some() {
            entry.options.insert(FileOptions::ENCRYPT);
        }

        let data_stream = select_data_stream(entry, self.jcr.config.native_layout)?;
        let file_index = self.send_attributes(entry, data_stream)?;

        if entry.ftype.is_object() || entry.ftype == FileType::Deleted {
            return Ok(());
        }

        if has_data && self.session.is_some() {
            self.send_session(file_index, entry)?;
        }

        // Directory-family entries have no portable data, but the native
        // layout preserves their OS-native streams through a data phase.
        let do_read = (entry.ftype != FileType::HardlinkRef
            && entry.stat.is_regular()
            && entry.stat.size > 0)
            || matches!(entry.ftype, FileType::RawDevice | FileType::Fifo)
            || (entry.ftype.is_directory_like() && self.jcr.config.native_layout);

        if do_read {
            let no_atime = entry.options.contains(FileOptions::NO_ATIME);
            let mut source = if entry.ftype == FileType::Fifo {
                BlockSource::open_fifo(
                    &entry.path,
                    self.jcr.config.read_block_size,
                    self.jcr.config.fifo_read_timeout,
                )
            } else {
                match BlockSource::open(&entry.path, no_atime) {
                    Ok(source) => source,
                    Err(err) => {
                        warn!(path = %entry.path.display(), %err, "cannot open, not saved");
                        self.count_file_error()?;
                        return Ok(());
                    }
                }
            };

            self.send_data(file_index, entry, data_stream, &mut source, &mut digest, &mut signing)?;

            if entry.options.contains(FileOptions::CHECK_CHANGES) {
                self.check_changed(entry)?;
            }
        }

        self.send_resource_fork(file_index, entry, &mut digest, &mut signing)?;
        self.send_metadata(file_index, entry)?;
        self.finalize_digests(file_index, entry, digest, signing)?;

        if self.jcr.is_canceled() {
            return Err(EngineError::Canceled);
        }
        Ok(())
    }

    fn count_file_error(&self) -> Result<(), EngineError> {
        let total = self.jcr.add_error();
        if total > self.jcr.config.max_job_errors {
            return Err(EngineError::TooManyErrors(total));
        }
        Ok(())
    }

    // Attribute, metadata, and digest records do not count towards the
    // job's data bytes; only the data phase and the session record do.
    fn send_record(
        &mut self,
        file_index: u32,
        stream: StreamId,
        payload: &[u8],
    ) -> Result<(), EngineError> {
        self.link
            .send_header(&RecordHeader::new(file_index, stream, 0))?;
        self.link.send_payload(payload)?;
        self.link.signal_eod()?;
        Ok(())
    }

    /// Emits the attribute record and assigns the file index.
    fn send_attributes(
        &mut self,
        entry: &FileEntry,
        data_stream: StreamId,
    ) -> Result<u32, EngineError> {
        let file_index = self.jcr.next_file_index();
        self.jcr
            .set_last_file(&entry.path.to_string_lossy(), entry.ftype);

        let name = entry.wire_name();
        let link = entry.wire_link();

        let link_index = if entry.ftype == FileType::HardlinkRef {
            self.registry
                .lookup(entry.stat.dev, entry.stat.ino)
                .map_or(entry.link_index, |linked| linked.file_index)
        } else {
            entry.link_index
        };

        let attrs = flist::stat::encode_stat(&entry.stat, link_index, data_stream.code());
        let attribs_ex =
            if entry.options.contains(FileOptions::HFS_PLUS) && entry.fork_len > 0 {
                to_base64(entry.fork_len)
            } else {
                String::new()
            };

        // Directory-family records carry the canonical name with a trailing
        // slash; link-bearing records carry their target in the link field.
        let packet_name = if entry.ftype.is_directory_like() && !name.ends_with('/') {
            format!("{name}/")
        } else {
            name.clone()
        };
        let packet_link = if entry.ftype.carries_link() { link } else { String::new() };

        let attr_stream = if entry.ftype.is_object() {
            StreamId::RestoreObject
        } else {
            StreamId::UnixAttributes
        };

        let payload = AttributePacket::compose(
            file_index,
            entry.ftype,
            &packet_name,
            &attrs,
            &packet_link,
            &attribs_ex,
            entry.delta_seq,
        );
        debug!(file_index, stream = attr_stream.code(), name = %packet_name, "attributes");
        self.send_record(file_index, attr_stream, &payload)?;

        if entry.ftype != FileType::HardlinkRef
            && entry.stat.nlink > 1
            && entry.stat.is_regular()
        {
            self.registry
                .record(entry.stat.dev, entry.stat.ino, file_index, &name);
        }

        Ok(file_index)
    }

    /// Replays the cached session blob ahead of an encrypted data phase.
    fn send_session(&mut self, file_index: u32, entry: &FileEntry) -> Result<(), EngineError> {
        let session = self.session.as_ref().expect("session present");
        let encoded = session.encoded().to_vec();
        self.link.send_header(&RecordHeader::new(
            file_index,
            StreamId::EncryptedSessionData,
            entry.stat.size,
        ))?;
        self.link.send_payload(&encoded)?;
        self.link.signal_eod()?;
        self.jcr
            .counters
            .bytes_sent
            .fetch_add(encoded.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Streams one open source through the transform chain.
    fn send_data(
        &mut self,
        file_index: u32,
        entry: &FileEntry,
        stream: StreamId,
        source: &mut BlockSource,
        digest: &mut Option<FileDigest>,
        signing: &mut Option<FileDigest>,
    ) -> Result<(), EngineError> {
        let sparse = entry.options.contains(FileOptions::SPARSE);
        let offsets = entry.options.contains(FileOptions::OFFSETS);
        let compress_algo = if entry.options.contains(FileOptions::COMPRESS) {
            Some(
                entry
                    .compression
                    .unwrap_or((Algorithm::Gzip, CompressionLevel::Default)),
            )
        } else {
            None
        };

        let mut cipher = if entry.options.contains(FileOptions::ENCRYPT) {
            if sparse || offsets {
                return Err(EngineError::EncryptedSparse);
            }
            let session = self.session.as_ref().ok_or(EngineError::NoRecipients)?;
            Some(CipherContext::new(session.keys())?)
        } else {
            None
        };

        let framed = match compress_algo {
            Some((Algorithm::Gzip, level)) => {
                self.deflater.set_level(level);
                None
            }
            Some((Algorithm::Lz4, level)) => {
                Some(FramedBlockCodec::new(level.as_numeric() as u16))
            }
            None => None,
        };

        self.link
            .send_header(&RecordHeader::new(file_index, stream, entry.stat.size))?;

        let rsize = self.jcr.config.read_block_size;
        let mut read_buf = vec![0u8; rsize];
        let mut comp_buf: Vec<u8> = Vec::new();
        let mut crypto_buf: Vec<u8> = Vec::new();
        let mut record_buf: Vec<u8> = Vec::with_capacity(ADDR_HEADER + rsize);
        let mut file_addr: u64 = 0;
        let mut read_failed = false;

        loop {
            if self.jcr.is_canceled() {
                return Err(EngineError::Canceled);
            }
            let len = match source.read_block(&mut read_buf) {
                Ok(0) => break,
                Ok(len) => len,
                Err(err) => {
                    warn!(path = %entry.path.display(), %err, "read error on file");
                    self.count_file_error()?;
                    read_failed = true;
                    break;
                }
            };
            let block = &read_buf[..len];

            // Sparse elision: a full block whose tail stays inside the file
            // size (or any block of a sizeless raw/fifo source) that is all
            // zero advances the address without producing a record.
            let mut prefix = None;
            if sparse {
                let inside = len == rsize && file_addr + len as u64 <= entry.stat.size as u64;
                let sizeless = matches!(entry.ftype, FileType::RawDevice | FileType::Fifo)
                    && entry.stat.size == 0;
                if (inside || sizeless) && is_all_zero(block) {
                    file_addr += len as u64;
                    continue;
                }
                prefix = Some(file_addr);
            } else if offsets {
                prefix = Some(file_addr);
            }

            self.jcr
                .counters
                .bytes_read
                .fetch_add(len as u64, Ordering::Relaxed);
            if let Some(digest) = digest.as_mut() {
                digest.update(block);
            }
            if let Some(signing) = signing.as_mut() {
                signing.update(block);
            }

            let payload: &[u8] = match compress_algo {
                Some((Algorithm::Gzip, _)) => {
                    self.deflater.compress_block(block, &mut comp_buf)?;
                    &comp_buf
                }
                Some((Algorithm::Lz4, _)) => {
                    framed
                        .as_ref()
                        .expect("framed codec prepared")
                        .compress_block(block, &mut comp_buf);
                    &comp_buf
                }
                None => block,
            };

            let wire: &[u8] = if let Some(cipher) = cipher.as_mut() {
                crypto_buf.clear();
                cipher.update(&(payload.len() as u32).to_be_bytes(), &mut crypto_buf);
                cipher.update(payload, &mut crypto_buf);
                if crypto_buf.is_empty() {
                    // No full cipher block yet, read more data.
                    file_addr += len as u64;
                    continue;
                }
                &crypto_buf
            } else {
                payload
            };

            if let Some(addr) = prefix {
                record_buf.clear();
                record_buf.extend_from_slice(&addr.to_be_bytes());
                record_buf.extend_from_slice(wire);
                self.link.send_payload(&record_buf)?;
                self.jcr
                    .counters
                    .bytes_sent
                    .fetch_add(record_buf.len() as u64, Ordering::Relaxed);
            } else {
                self.link.send_payload(wire)?;
                self.jcr
                    .counters
                    .bytes_sent
                    .fetch_add(wire.len() as u64, Ordering::Relaxed);
            }
            file_addr += len as u64;
        }

        if !read_failed {
            if let Some(cipher) = cipher.take() {
                crypto_buf.clear();
                cipher.finalize(&mut crypto_buf)?;
                if !crypto_buf.is_empty() {
                    self.link.send_payload(&crypto_buf)?;
                    self.jcr
                        .counters
                        .bytes_sent
                        .fetch_add(crypto_buf.len() as u64, Ordering::Relaxed);
                }
            }
        }

        self.link.signal_eod()?;
        Ok(())
    }

    /// Emits the resource fork and Finder info follow-ups.
    fn send_resource_fork(
        &mut self,
        file_index: u32,
        entry: &mut FileEntry,
        digest: &mut Option<FileDigest>,
        signing: &mut Option<FileDigest>,
    ) -> Result<(), EngineError> {
        if entry.ftype == FileType::HardlinkRef
            || !entry.stat.is_regular()
            || !entry.options.contains(FileOptions::HFS_PLUS)
        {
            return Ok(());
        }

        if entry.fork_len > 0 {
            let Some(fork_path) = entry.fork_path.clone() else {
                warn!(path = %entry.path.display(), "cannot open resource fork, not saved");
                self.count_file_error()?;
                return Ok(());
            };
            match BlockSource::open(&fork_path, false) {
                Ok(mut source) => {
                    let fork_stream = if entry.options.contains(FileOptions::ENCRYPT) {
                        StreamId::EncryptedMacosForkData
                    } else {
                        StreamId::MacosForkData
                    };
                    // The fork phase never compresses and never sparse-encodes.
                    let saved = entry.options;
                    entry.options.remove(
                        FileOptions::COMPRESS
                            .with(FileOptions::SPARSE)
                            .with(FileOptions::OFFSETS),
                    );
                    let result = self.send_data(
                        file_index,
                        entry,
                        fork_stream,
                        &mut source,
                        digest,
                        signing,
                    );
                    entry.options = saved;
                    result?;
                }
                Err(err) => {
                    warn!(path = %fork_path.display(), %err, "cannot open resource fork, not saved");
                    self.count_file_error()?;
                    return Ok(());
                }
            }
        }

        let info = entry.finder_info.unwrap_or([0u8; 32]);
        if let Some(digest) = digest.as_mut() {
            digest.update(&info);
        }
        if let Some(signing) = signing.as_mut() {
            signing.update(&info);
        }
        self.send_record(file_index, StreamId::HfsPlusAttributes, &info)?;
        Ok(())
    }

    /// Emits ACL and xattr follow-ups through the metadata backend.
    fn send_metadata(&mut self, file_index: u32, entry: &FileEntry) -> Result<(), EngineError> {
        if entry.ftype == FileType::SymLink {
            return Ok(());
        }

        if entry.options.contains(FileOptions::ACL) {
            let records = match self.backend.backup_acl(entry) {
                Ok(records) => records,
                Err(MetadataError::Fatal(message)) => return Err(EngineError::Metadata(message)),
                Err(_) => Vec::new(),
            };
            for (stream, payload) in records {
                self.send_record(file_index, stream, &payload)?;
            }
        }

        if entry.options.contains(FileOptions::XATTR) {
            let records = match self.backend.backup_xattr(entry) {
                Ok(records) => records,
                Err(MetadataError::Fatal(message)) => return Err(EngineError::Metadata(message)),
                Err(_) => Vec::new(),
            };
            for (stream, payload) in records {
                self.send_record(file_index, stream, &payload)?;
            }
        }

        Ok(())
    }

    /// Finalises and emits the signature and digest records.
    fn finalize_digests(
        &mut self,
        file_index: u32,
        entry: &FileEntry,
        digest: Option<FileDigest>,
        signing: Option<FileDigest>,
    ) -> Result<(), EngineError> {
        if let Some(signing) = signing {
            let keypair = self
                .jcr
                .config
                .keypair
                .as_ref()
                .expect("signing digest implies a keypair");
            let bytes = signing.finalize();
            let record =
                crypto::SignatureRecord::sign(keypair, self.jcr.config.signing_digest, &bytes)?;
            self.send_record(file_index, StreamId::SignedDigest, &record.encode())?;
        }

        if let Some(digest) = digest {
            let kind = digest.kind();
            let bytes = digest.finalize();
            let stream = digest_stream(kind);
            self.send_record(file_index, stream, &bytes)?;
            if entry.stat.nlink > 1 {
                self.registry
                    .set_digest(entry.stat.dev, entry.stat.ino, stream, &bytes);
            }
        }

        // A hard-link reference re-sends the digest recorded for the path
        // that carried the data.
        if entry.ftype == FileType::HardlinkRef {
            let resend = self
                .registry
                .lookup(entry.stat.dev, entry.stat.ino)
                .and_then(|linked| linked.digest.clone());
            if let Some((stream, bytes)) = resend {
                self.send_record(file_index, stream, &bytes)?;
            }
        }

        Ok(())
    }

    /// Warns when a source changed while it was being read.
    fn check_changed(&mut self, entry: &FileEntry) -> Result<(), EngineError> {
        let Ok(meta) = std::fs::symlink_metadata(&entry.path) else {
            return Ok(());
        };
        let now = flist::UnixStat::from_metadata(&meta);
        if now.mtime != entry.stat.mtime {
            warn!(path = %entry.path.display(), "file changed during backup: mtime differs");
            self.count_file_error()?;
        } else if now.size != entry.stat.size {
            warn!(path = %entry.path.display(), "file changed during backup: size differs");
            self.count_file_error()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_detection() {
        assert!(is_all_zero(&[0u8; 4096]));
        assert!(!is_all_zero(&[0, 0, 1, 0]));
        assert!(is_all_zero(&[]));
    }

    #[test]
    fn digest_streams_match_their_kinds() {
        assert_eq!(digest_stream(DigestKind::Md5), StreamId::Md5Digest);
        assert_eq!(digest_stream(DigestKind::Sha1), StreamId::Sha1Digest);
        assert_eq!(digest_stream(DigestKind::Sha256), StreamId::Sha256Digest);
        assert_eq!(digest_stream(DigestKind::Sha512), StreamId::Sha512Digest);
    }

    #[test]
    fn read_full_fills_across_short_reads() {
        struct Dribble(Vec<u8>);
        impl Read for Dribble {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.0.is_empty() {
                    return Ok(0);
                }
                let take = 3.min(self.0.len()).min(buf.len());
                buf[..take].copy_from_slice(&self.0[..take]);
                self.0.drain(..take);
                Ok(take)
            }
        }

        let mut source = Dribble(b"0123456789".to_vec());
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut source, &mut buf).expect("read"), 8);
        assert_eq!(&buf, b"01234567");
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut source, &mut buf).expect("read"), 2);
        assert_eq!(&buf[..2], b"89");
    }
}
