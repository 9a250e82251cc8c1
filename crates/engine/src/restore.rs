//! The per-file restore state machine.
//!
//! Dispatch is driven entirely by the stream identifier of each received
//! record. An attributes record closes the previous file and opens the next
//! target; data records run the inverse transform chain (decrypt with
//! deferred packet flushing, sparse seek, decompress, write); metadata
//! records queue for application after the stat tuple is replayed; digest
//! and signature records become pending verifications resolved when the
//! file closes. The sequence tolerates any interleaving the backup side may
//! produce.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use checksums::{DigestKind, FileDigest};
use compress::{BlockInflater, FrameError, FramedBlockCodec};
use crypto::{DecipherContext, Keypair, PacketBuffer, SessionKeys, SignatureRecord};
use flist::{AttributePacket, FileType};
use metadata::{MetadataBackend, MetadataError};
use protocol::{LinkEvent, ReceivedRecord, RecordLink, StreamId};
use tracing::{debug, error, info, warn};

use crate::backup::ADDR_HEADER;
use crate::delay::DelayQueue;
use crate::error::EngineError;
use crate::job::{JobContext, JobStatus, ReplaceMode};
use crate::portable_filter::PortableFilter;
use crate::worker::ChunkWriter;

fn digest_kind_for(stream: StreamId) -> Option<DigestKind> {
    match stream {
        StreamId::Md5Digest => Some(DigestKind::Md5),
        StreamId::Sha1Digest => Some(DigestKind::Sha1),
        StreamId::Sha256Digest => Some(DigestKind::Sha256),
        StreamId::Sha512Digest => Some(DigestKind::Sha512),
        _ => None,
    }
}

/// Counters of streams this agent received but could not honour, plus the
/// metadata error totals, reported once at job end.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Unsupported data streams.
    pub non_supported_data: u32,
    /// Unsupported attribute streams.
    pub non_supported_attr: u32,
    /// Unsupported resource-fork streams.
    pub non_supported_rsrc: u32,
    /// Unsupported Finder-info streams.
    pub non_supported_finfo: u32,
    /// Unsupported ACL streams.
    pub non_supported_acl: u32,
    /// Unsupported xattr streams.
    pub non_supported_xattr: u32,
    /// Unsupported crypto streams.
    pub non_supported_crypto: u32,
    /// Program name/data streams (always ignored).
    pub non_supported_progname: u32,
    /// Non-fatal ACL apply errors.
    pub acl_errors: u32,
    /// Non-fatal xattr apply errors.
    pub xattr_errors: u32,
}

/// Transform flags decoded from a data record's stream identifier.
#[derive(Clone, Copy, Debug, Default)]
struct ExtractFlags {
    sparse: bool,
    compress: Option<StreamId>,
    encrypted: bool,
    win32_decomp: bool,
}

/// A restore target: a seekable file, or a blocking sink fed through the
/// bounded writer queue.
enum Output {
    Disk(File),
    Queue(ChunkWriter),
}

impl Output {
    fn write_block(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Disk(file) => file.write_all(data),
            Self::Queue(writer) => writer
                .push(data.to_vec())
                .map_err(|()| std::io::Error::other("writer task stopped")),
        }
    }

    fn seek_to(&mut self, addr: u64) -> std::io::Result<()> {
        match self {
            Self::Disk(file) => file.seek(SeekFrom::Start(addr)).map(|_| ()),
            Self::Queue(_) => Err(std::io::Error::other("target does not support seeking")),
        }
    }
}

/// Cipher state of one incoming encrypted stream.
#[derive(Default)]
struct FileCipher {
    ctx: Option<DecipherContext>,
    packets: PacketBuffer,
}

impl FileCipher {
    fn clear(&mut self) {
        self.ctx = None;
        self.packets.clear();
    }
}

enum CreateStatus {
    Extract(Output),
    Created,
    Skip,
    Error,
}

#[derive(Default)]
struct RestoreState {
    stream: i32,
    prev_stream: i32,
    extract: bool,
    attr: Option<AttributePacket>,
    out: Option<Output>,
    out_path: PathBuf,
    file_addr: u64,
    flags: ExtractFlags,
    session: Option<SessionKeys>,
    cipher: FileCipher,
    fork_cipher: FileCipher,
    fork_out: Option<File>,
    fork_addr: u64,
    fork_size: i64,
    fork_flags: ExtractFlags,
    announced_fork_len: i64,
    pending_sig: Option<SignatureRecord>,
    pending_digest: Option<(DigestKind, Vec<u8>)>,
    signing_digest: Option<FileDigest>,
    delayed: DelayQueue,
    filter: PortableFilter,
    sparse_active: bool,
}

/// The receive-side pipeline for one job.
pub struct RestorePipeline<'a, L, B>
where
    L: RecordLink,
    B: MetadataBackend,
{
    jcr: Arc<JobContext>,
    link: &'a mut L,
    backend: &'a mut B,
    keypairs: Vec<Keypair>,
    summary: RestoreSummary,
    inflater: BlockInflater,
    scratch: Vec<u8>,
    state: RestoreState,
}

impl<'a, L, B> RestorePipeline<'a, L, B>
where
    L: RecordLink,
    B: MetadataBackend,
{
    /// Sets up the receive-side state for one job.
    pub fn new(jcr: Arc<JobContext>, link: &'a mut L, backend: &'a mut B) -> Self {
        let keypairs = jcr.config.keypair.clone().into_iter().collect();
        let inflate_budget =
            jcr.config.read_block_size + 12 + jcr.config.read_block_size / 1000 + 100;
        Self {
            jcr,
            link,
            backend,
            keypairs,
            summary: RestoreSummary::default(),
            inflater: BlockInflater::new(inflate_budget),
            scratch: Vec::new(),
            state: RestoreState::default(),
        }
    }

    /// Consumes the stream to completion and resolves the job status.
    pub fn run(&mut self) -> (JobStatus, RestoreSummary) {
        let status = match self.do_restore() {
            Ok(()) => self.jcr.finish_status(),
            Err(EngineError::Canceled) => JobStatus::Canceled,
            Err(EngineError::Link(err)) => {
                if !self.jcr.is_canceled() {
                    error!(%err, "data record error");
                }
                JobStatus::FatalError
            }
            Err(err) => {
                error!(%err, "restore terminated");
                JobStatus::ErrorTerminated
            }
        };

        self.summary.acl_errors = self.backend.acl_errors();
        self.summary.xattr_errors = self.backend.xattr_errors();
        self.report_summary();
        (status, self.summary)
    }

    fn report_summary(&self) {
        let summary = &self.summary;
        if summary.non_supported_data > 1 || summary.non_supported_attr > 1 {
            warn!(
                data = summary.non_supported_data,
                attrs = summary.non_supported_attr,
                "non-supported data and attrib streams ignored"
            );
        }
        if summary.non_supported_rsrc > 0 {
            info!(count = summary.non_supported_rsrc, "non-supported resource fork streams ignored");
        }
        if summary.non_supported_finfo > 0 {
            info!(count = summary.non_supported_finfo, "non-supported Finder Info streams ignored");
        }
        if summary.non_supported_acl > 0 {
            info!(count = summary.non_supported_acl, "non-supported acl streams ignored");
        }
        if summary.non_supported_crypto > 0 {
            info!(count = summary.non_supported_crypto, "non-supported crypto streams ignored");
        }
        if summary.non_supported_xattr > 0 {
            info!(count = summary.non_supported_xattr, "non-supported xattr streams ignored");
        }
        if summary.acl_errors > 0 {
            warn!(count = summary.acl_errors, "encountered acl errors while doing restore");
        }
        if summary.xattr_errors > 0 {
            warn!(count = summary.xattr_errors, "encountered xattr errors while doing restore");
        }
    }

    fn do_restore(&mut self) -> Result<(), EngineError> {
        loop {
            if self.jcr.is_canceled() {
                return Err(EngineError::Canceled);
            }
            match self.link.recv()? {
                LinkEvent::Closed => break,
                // Partial ciphertext survives end-of-data markers; nothing
                // to do between record groups.
                LinkEvent::EndOfData => {}
                LinkEvent::Record(record) => self.dispatch(record)?,
            }
        }

        self.close_fork();
        self.close_current()?;
        Ok(())
    }

    fn dispatch(&mut self, record: ReceivedRecord) -> Result<(), EngineError> {
        self.state.prev_stream = self.state.stream;
        self.state.stream = record.stream;

        let Ok(stream) = StreamId::try_from(record.stream) else {
            self.close_current()?;
            warn!(stream = record.stream, "unknown stream ignored, this shouldn't happen");
            return Ok(());
        };

        // Any stream change closes and resets the alternate data stream.
        if self.state.prev_stream != self.state.stream {
            if self.state.fork_out.is_some() {
                self.close_fork();
            }
            self.state.fork_size = -1;
            self.state.fork_addr = 0;
        }

        match stream {
            StreamId::UnixAttributes | StreamId::UnixAttributesEx => {
                self.on_attributes(&record)?;
            }
            StreamId::EncryptedSessionData => self.on_session(&record),
            stream if stream.is_data() => self.on_data(stream, &record)?,
            stream if stream.is_fork() => self.on_fork(stream, &record),
            StreamId::HfsPlusAttributes => self.on_finder_info(&record),
            stream if stream.is_acl() => self.on_acl(stream, &record),
            stream if stream.is_xattr() => self.on_xattr(stream, &record),
            StreamId::SignedDigest => self.on_signature(&record),
            stream if stream.is_digest() => self.on_digest(stream, &record),
            StreamId::ProgramNames | StreamId::ProgramData => {
                if self.summary.non_supported_progname == 0 {
                    info!("got program name or data stream, ignored");
                }
                self.summary.non_supported_progname += 1;
            }
            StreamId::PluginName => {
                self.close_current()?;
                debug!("plugin name stream ignored");
            }
            StreamId::RestoreObject => {}
            other => {
                self.close_current()?;
                warn!(stream = other.code(), "unhandled stream ignored");
            }
        }
        Ok(())
    }

    fn output_path(&self, name: &str) -> PathBuf {
        let trimmed = name.trim_end_matches('/');
        let name = if trimmed.is_empty() { "/" } else { trimmed };
        match &self.jcr.config.restore_prefix {
            None => PathBuf::from(name),
            Some(prefix) => prefix.join(name.trim_start_matches('/')),
        }
    }

    fn on_attributes(&mut self, record: &ReceivedRecord) -> Result<(), EngineError> {
        self.close_current()?;

        let attr = AttributePacket::parse(&record.payload)?;
        if attr.ftype == FileType::Deleted || attr.ftype.is_object() {
            return Ok(());
        }

        let announced = attr.decoded.data_stream;
        if announced != 0 && StreamId::try_from(announced).is_err() {
            if self.summary.non_supported_data == 0 {
                warn!(stream = announced, "data stream not supported on this client");
            }
            self.summary.non_supported_data += 1;
            return Ok(());
        }

        self.jcr.counters.files_examined.fetch_add(1, Ordering::Relaxed);
        let out_path = self.output_path(&attr.name);
        self.jcr.set_last_file(&attr.name, attr.ftype);

        self.state.extract = false;
        self.state.file_addr = 0;
        // The announced data stream decides sparse handling even when every
        // block was elided and no data record arrives at all.
        self.state.sparse_active =
            StreamId::try_from(announced).is_ok_and(StreamId::is_sparse);
        self.state.filter.reset();

        match self.create_file(&attr, &out_path) {
            CreateStatus::Error | CreateStatus::Skip => {
                self.jcr.counters.files_sent.fetch_add(1, Ordering::Relaxed);
            }
            CreateStatus::Extract(out) => {
                self.state.extract = true;
                self.state.out = Some(out);
                self.jcr.counters.files_sent.fetch_add(1, Ordering::Relaxed);
            }
            CreateStatus::Created => {
                self.jcr.counters.files_sent.fetch_add(1, Ordering::Relaxed);
                // No content expected: replay the attributes immediately.
                let errors = metadata::replay_attributes(&out_path, &attr.decoded.stat, attr.ftype);
                for _ in 0..errors {
                    self.jcr.add_error();
                }
            }
        }

        self.state.announced_fork_len = attr.fork_length();
        self.state.out_path = out_path;
        self.state.attr = Some(attr);
        Ok(())
    }

    fn create_file(&mut self, attr: &AttributePacket, path: &Path) -> CreateStatus {
        if let Some(parent) = path.parent() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %path.display(), %err, "cannot make parent directories");
                self.jcr.add_error();
                return CreateStatus::Error;
            }
        }

        let existing = std::fs::symlink_metadata(path).ok();
        if let Some(meta) = &existing {
            if !meta.is_dir() {
                match self.jcr.config.replace {
                    ReplaceMode::Never => {
                        info!(path = %path.display(), "not replacing existing file");
                        return CreateStatus::Skip;
                    }
                    ReplaceMode::IfNewer => {
                        let existing_mtime = mtime_of(meta);
                        if existing_mtime >= attr.decoded.stat.mtime {
                            info!(path = %path.display(), "not replacing newer file");
                            return CreateStatus::Skip;
                        }
                    }
                    ReplaceMode::IfOlder => {
                        let existing_mtime = mtime_of(meta);
                        if existing_mtime <= attr.decoded.stat.mtime {
                            info!(path = %path.display(), "not replacing older file");
                            return CreateStatus::Skip;
                        }
                    }
                    ReplaceMode::Always => {}
                }
            }
        }

        match attr.ftype {
            FileType::Regular | FileType::RegularEmpty => {
                if existing.as_ref().is_some_and(|meta| !meta.is_file()) {
                    if let Err(err) = remove_any(path) {
                        warn!(path = %path.display(), %err, "cannot replace existing object");
                        self.jcr.add_error();
                        return CreateStatus::Error;
                    }
                }
                match std::fs::OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                {
                    Ok(file) => {
                        if attr.decoded.stat.size > 0 {
                            CreateStatus::Extract(Output::Disk(file))
                        } else {
                            CreateStatus::Created
                        }
                    }
                    Err(err) => {
                        warn!(path = %path.display(), %err, "cannot create file");
                        self.jcr.add_error();
                        CreateStatus::Error
                    }
                }
            }
            FileType::RawDevice => match std::fs::OpenOptions::new().write(true).open(path) {
                Ok(file) => CreateStatus::Extract(Output::Disk(file)),
                Err(err) => {
                    warn!(path = %path.display(), %err, "cannot open device for restore");
                    self.jcr.add_error();
                    CreateStatus::Error
                }
            },
            FileType::Fifo => {
                if existing.is_none() {
                    if let Err(err) =
                        metadata::create_fifo(path, attr.decoded.stat.permissions())
                    {
                        warn!(path = %path.display(), %err, "cannot create fifo");
                        self.jcr.add_error();
                        return CreateStatus::Error;
                    }
                }
                CreateStatus::Extract(Output::Queue(ChunkWriter::spawn_path(
                    path.to_path_buf(),
                    ChunkWriter::DEFAULT_DEPTH,
                )))
            }
            FileType::SymLink => {
                if existing.is_some() {
                    if let Err(err) = remove_any(path) {
                        warn!(path = %path.display(), %err, "cannot replace existing object");
                        self.jcr.add_error();
                        return CreateStatus::Error;
                    }
                }
                match std::os::unix::fs::symlink(&attr.link, path) {
                    Ok(()) => CreateStatus::Created,
                    Err(err) => {
                        warn!(path = %path.display(), %err, "cannot create symlink");
                        self.jcr.add_error();
                        CreateStatus::Error
                    }
                }
            }
            FileType::HardlinkRef => {
                let target = self.output_path(&attr.link);
                if existing.is_some() {
                    if let Err(err) = remove_any(path) {
                        warn!(path = %path.display(), %err, "cannot replace existing object");
                        self.jcr.add_error();
                        return CreateStatus::Error;
                    }
                }
                match std::fs::hard_link(&target, path) {
                    Ok(()) => CreateStatus::Created,
                    Err(err) => {
                        warn!(
                            path = %path.display(),
                            target = %target.display(),
                            %err,
                            "cannot create hard link"
                        );
                        self.jcr.add_error();
                        CreateStatus::Error
                    }
                }
            }
            FileType::DirEnd | FileType::Reparse | FileType::Junction => {
                match std::fs::create_dir_all(path) {
                    Ok(()) => CreateStatus::Created,
                    Err(err) => {
                        warn!(path = %path.display(), %err, "cannot create directory");
                        self.jcr.add_error();
                        CreateStatus::Error
                    }
                }
            }
            FileType::Special => {
                let stat = &attr.decoded.stat;
                if stat.is_socket() {
                    debug!(path = %path.display(), "socket not restored");
                    return CreateStatus::Skip;
                }
                if existing.is_some() {
                    return CreateStatus::Created;
                }
                let result = if stat.is_fifo() {
                    metadata::create_fifo(path, stat.permissions())
                } else {
                    metadata::create_device_node(
                        path,
                        stat.permissions(),
                        stat.rdev,
                        stat.is_block_device(),
                    )
                };
                match result {
                    Ok(()) => CreateStatus::Created,
                    Err(err) => {
                        warn!(path = %path.display(), %err, "cannot create special file");
                        self.jcr.add_error();
                        CreateStatus::Error
                    }
                }
            }
            _ => CreateStatus::Skip,
        }
    }

    fn on_session(&mut self, record: &ReceivedRecord) {
        if !self.state.extract {
            return;
        }
        if self.state.session.is_some() {
            error!("unexpected cryptographic session data stream");
            self.jcr.add_error();
            self.abandon_file();
            return;
        }
        if self.keypairs.is_empty() {
            error!("no private decryption keys have been defined to decrypt encrypted backup data");
            self.jcr.add_error();
            self.abandon_file();
            return;
        }

        match crypto::CryptoSession::decode(&record.payload, &self.keypairs) {
            Ok(keys) => {
                self.state.signing_digest =
                    Some(FileDigest::new(self.jcr.config.signing_digest));
                self.state.session = Some(keys);
            }
            Err(err) => {
                error!(%err, "decoding encrypted session data stream failed");
                self.jcr.add_error();
                self.summary.non_supported_crypto += 1;
                self.abandon_file();
            }
        }
    }

    fn on_data(&mut self, stream: StreamId, record: &ReceivedRecord) -> Result<(), EngineError> {
        if !self.state.extract {
            return Ok(());
        }

        // Force an expected, consistent stream type.
        let prev = self.state.prev_stream;
        let expected = prev == stream.code()
            || prev == StreamId::UnixAttributes.code()
            || prev == StreamId::UnixAttributesEx.code()
            || prev == StreamId::EncryptedSessionData.code();
        if !expected {
            return Ok(());
        }

        let mut flags = ExtractFlags {
            sparse: stream.is_sparse(),
            compress: stream.is_compressed().then_some(stream),
            encrypted: stream.is_encrypted(),
            win32_decomp: stream.is_win32(),
        };

        if flags.encrypted && self.state.cipher.ctx.is_none() {
            let Some(session) = self.state.session.as_ref() else {
                error!(file = %self.jcr.last_file_name(), "missing encryption session data stream");
                self.jcr.add_error();
                self.abandon_file();
                return Ok(());
            };
            match DecipherContext::new(session) {
                Ok(ctx) => self.state.cipher.ctx = Some(ctx),
                Err(err) => {
                    error!(%err, "failed to initialize decryption context");
                    self.jcr.add_error();
                    self.state.session = None;
                    self.abandon_file();
                    return Ok(());
                }
            }
        }

        if flags.win32_decomp && self.jcr.config.native_layout {
            flags.win32_decomp = false;
        }
        self.state.flags = flags;
        self.state.sparse_active |= flags.sparse;

        let Some(mut out) = self.state.out.take() else {
            error!("logic error: output file should be open");
            self.abandon_file();
            return Ok(());
        };

        let step = extract_into(
            &self.jcr,
            &mut self.inflater,
            &mut self.scratch,
            &mut self.state.filter,
            &mut out,
            &mut self.state.file_addr,
            flags,
            &mut self.state.cipher,
            &mut self.state.signing_digest,
            &record.payload,
            &self.state.out_path,
        );
        self.state.out = Some(out);

        match step {
            Ok(()) => Ok(()),
            Err(ExtractError::Fatal(err)) => Err(err),
            Err(ExtractError::Abandon(message)) => {
                warn!(file = %self.state.out_path.display(), "{message}");
                self.jcr.add_error();
                self.abandon_file();
                Ok(())
            }
        }
    }

    fn on_fork(&mut self, stream: StreamId, record: &ReceivedRecord) {
        // Resource forks restore only where the platform has them; the
        // attempt is gated on Finder-info support, which shares the gate.
        if !cfg!(target_os = "macos") {
            self.summary.non_supported_rsrc += 1;
            return;
        }
        if !self.state.extract {
            return;
        }

        let mut flags = ExtractFlags::default();
        if stream == StreamId::EncryptedMacosForkData {
            flags.encrypted = true;
            if self.state.fork_cipher.ctx.is_none() {
                let Some(session) = self.state.session.as_ref() else {
                    error!("missing encryption session data stream");
                    self.jcr.add_error();
                    self.abandon_file();
                    return;
                };
                match DecipherContext::new(session) {
                    Ok(ctx) => self.state.fork_cipher.ctx = Some(ctx),
                    Err(err) => {
                        error!(%err, "failed to initialize decryption context");
                        self.jcr.add_error();
                        self.abandon_file();
                        return;
                    }
                }
            }
        }
        self.state.fork_flags = flags;

        if self.state.fork_out.is_none() {
            let fork_path = fork_path_of(&self.state.out_path);
            match std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&fork_path)
            {
                Ok(file) => {
                    self.state.fork_out = Some(file);
                    self.state.fork_size = self.state.announced_fork_len;
                }
                Err(err) => {
                    warn!(path = %fork_path.display(), %err, "cannot open resource fork");
                    self.state.extract = false;
                    return;
                }
            }
        }

        let Some(file) = self.state.fork_out.as_mut() else {
            return;
        };
        let mut out = ForkWrite(file);
        let step = extract_fork(
            &self.jcr,
            &mut out,
            &mut self.state.fork_addr,
            flags,
            &mut self.state.fork_cipher,
            &mut self.state.signing_digest,
            &record.payload,
        );
        if let Err(message) = step {
            warn!(file = %self.state.out_path.display(), "{message}");
            self.jcr.add_error();
            self.state.fork_out = None;
            self.abandon_file();
        }
    }

    fn on_finder_info(&mut self, record: &ReceivedRecord) {
        if record.payload.len() != 32 {
            warn!(
                got = record.payload.len(),
                "invalid length of Finder Info (wanted 32)"
            );
            return;
        }
        match metadata::restore_finder_info(&self.state.out_path, &record.payload) {
            Ok(()) => {}
            Err(MetadataError::Unsupported(_)) => self.summary.non_supported_finfo += 1,
            Err(err) => {
                warn!(%err, "error setting Finder Info");
                self.jcr.add_error();
            }
        }
    }

    fn metadata_applies(&self) -> bool {
        let is_dir = self.jcr.last_file_type() == Some(FileType::DirEnd);
        (self.state.extract || is_dir) && !self.jcr.last_file_name().is_empty()
    }

    fn on_acl(&mut self, stream: StreamId, record: &ReceivedRecord) {
        if !self.metadata_applies() {
            return;
        }
        if self.jcr.last_file_type() == Some(FileType::DirEnd) {
            self.apply_metadata(stream, &record.payload);
        } else {
            self.state.delayed.push(stream, &record.payload);
        }
    }

    fn on_xattr(&mut self, stream: StreamId, record: &ReceivedRecord) {
        if !self.metadata_applies() {
            return;
        }
        // Solaris system xattrs must apply immediately; everything else on a
        // regular file waits for the stat tuple.
        if self.jcr.last_file_type() == Some(FileType::DirEnd)
            || stream == StreamId::XaclSolarisXattr
        {
            self.apply_metadata(stream, &record.payload);
        } else {
            self.state.delayed.push(stream, &record.payload);
        }
    }

    fn apply_metadata(&mut self, stream: StreamId, payload: &[u8]) {
        let path = self.state.out_path.clone();
        let result = if stream.is_acl() {
            self.backend.restore_acl(&path, stream, payload)
        } else {
            self.backend.restore_xattr(&path, stream, payload)
        };
        match result {
            Ok(()) => {}
            Err(MetadataError::Unsupported(_)) => {
                if stream.is_acl() {
                    self.summary.non_supported_acl += 1;
                } else {
                    self.summary.non_supported_xattr += 1;
                }
            }
            Err(err) => {
                warn!(%err, path = %path.display(), "metadata stream not applied");
                self.jcr.add_error();
            }
        }
    }

    fn on_signature(&mut self, record: &ReceivedRecord) {
        if self.state.pending_sig.is_some() {
            error!("unexpected cryptographic signature data stream");
            self.jcr.add_error();
            self.state.pending_sig = None;
            return;
        }
        if !self.state.extract {
            return;
        }
        match SignatureRecord::decode(&record.payload) {
            Ok(sig) => self.state.pending_sig = Some(sig),
            Err(err) => {
                error!(%err, file = %self.jcr.last_file_name(), "failed to decode message signature");
                self.jcr.add_error();
            }
        }
    }

    fn on_digest(&mut self, stream: StreamId, record: &ReceivedRecord) {
        if !self.state.extract {
            return;
        }
        if let Some(kind) = digest_kind_for(stream) {
            self.state.pending_digest = Some((kind, record.payload.clone()));
        }
    }

    /// Abandons the in-flight file after a per-file failure.
    fn abandon_file(&mut self) {
        self.state.extract = false;
        self.state.out = None;
        self.state.fork_out = None;
        self.state.cipher.clear();
        self.state.fork_cipher.clear();
        self.state.delayed.clear();
    }

    fn close_fork(&mut self) {
        if let Some(mut file) = self.state.fork_out.take() {
            if self.state.fork_cipher.ctx.is_some() {
                let mut out = ForkWrite(&mut file);
                flush_fork_cipher(
                    &self.jcr,
                    &mut out,
                    &mut self.state.fork_addr,
                    self.state.fork_flags,
                    &mut self.state.fork_cipher,
                    &mut self.state.signing_digest,
                );
            }
            if self.state.fork_size >= 0 {
                if let Ok(Some(mismatch)) =
                    metadata::verify_restored_size(&mut file, self.state.fork_size)
                {
                    warn!(
                        file = %self.state.out_path.display(),
                        expected = mismatch.expected,
                        actual = mismatch.actual,
                        "size of resource fork not correct"
                    );
                }
            }
        }
        self.state.fork_cipher.clear();
    }

    /// Closes the in-flight file: flush ciphers, verify the signature,
    /// replay attributes, drain delayed metadata, check the size, verify
    /// the pending digest.
    fn close_current(&mut self) -> Result<(), EngineError> {
        if !self.state.extract {
            if self.state.out.is_some() {
                error!("logic error: output file should not be open");
                self.state.out = None;
            }
            self.reset_file_state();
            return Ok(());
        }

        // Flush any remaining buffered cipher data.
        if self.state.prev_stream != StreamId::EncryptedSessionData.code() {
            if self.state.cipher.ctx.is_some() {
                if let Some(mut out) = self.state.out.take() {
                    flush_main_cipher(
                        &self.jcr,
                        &mut self.inflater,
                        &mut self.scratch,
                        &mut self.state.filter,
                        &mut out,
                        &mut self.state.file_addr,
                        self.state.flags,
                        &mut self.state.cipher,
                        &mut self.state.signing_digest,
                        &self.state.out_path,
                    );
                    self.state.out = Some(out);
                }
            }
            self.close_fork();
        }

        let attr = self.state.attr.take();

        // Verify the cryptographic signature, if any.
        self.verify_signature(attr.as_ref());

        // Replay attributes while the handle closes.
        if let Some(attr) = attr.as_ref() {
            let errors =
                metadata::replay_attributes(&self.state.out_path, &attr.decoded.stat, attr.ftype);
            for _ in 0..errors {
                self.jcr.add_error();
            }
        }

        // Delayed metadata: ACLs first, then xattrs, each in arrival order.
        for (stream, payload) in self.state.delayed.drain_ordered() {
            self.apply_metadata(stream, &payload);
        }

        // Size handling and close.
        let expected = attr.as_ref().map_or(0, |attr| attr.decoded.stat.size);
        let mut disk_target = false;
        match self.state.out.take() {
            Some(Output::Disk(mut file)) => {
                disk_target = true;
                if self.state.sparse_active {
                    let written = file.seek(SeekFrom::End(0)).unwrap_or(0);
                    if expected > 0 && written < expected as u64 {
                        // Trailing elided zero blocks: extend to full size.
                        if let Err(err) = file.set_len(expected as u64) {
                            warn!(%err, file = %self.state.out_path.display(), "cannot extend sparse file");
                            self.jcr.add_error();
                        }
                    }
                }
                if let Ok(Some(mismatch)) = metadata::verify_restored_size(&mut file, expected) {
                    warn!(
                        file = %self.state.out_path.display(),
                        expected = mismatch.expected,
                        actual = mismatch.actual,
                        "size of data or stream not correct"
                    );
                }
            }
            Some(Output::Queue(writer)) => {
                if let Err(err) = writer.finish() {
                    warn!(%err, file = %self.state.out_path.display(), "write error on restore target");
                    self.jcr.add_error();
                }
            }
            None => {}
        }

        // Verify the received file digest against the restored bytes.
        if self.jcr.config.verify_digests && disk_target {
            if let Some((kind, expected_digest)) = self.state.pending_digest.take() {
                if let Some(actual) = hash_file(&self.state.out_path, kind) {
                    if actual != expected_digest {
                        warn!(
                            file = %self.state.out_path.display(),
                            algorithm = %kind,
                            "digest mismatch on restored file"
                        );
                    }
                }
            }
        }

        self.reset_file_state();
        Ok(())
    }

    fn reset_file_state(&mut self) {
        self.state.extract = false;
        self.state.out = None;
        self.state.attr = None;
        self.state.pending_sig = None;
        self.state.pending_digest = None;
        self.state.session = None;
        self.state.signing_digest = None;
        self.state.cipher.clear();
        self.state.fork_cipher.clear();
        self.state.delayed.clear();
        self.state.sparse_active = false;
        self.state.announced_fork_len = 0;
        self.state.filter.reset();
    }

    /// Verifies the pending signature for the file being closed.
    ///
    /// When the signature's digest algorithm disagrees with the job-wide
    /// signing algorithm the restored file is re-read to compute the right
    /// digest. That doubles the I/O for verification; the behaviour is kept
    /// for compatibility with archives written under other defaults.
    fn verify_signature(&mut self, attr: Option<&AttributePacket>) {
        if !self.jcr.config.sign {
            return;
        }
        let Some(sig) = self.state.pending_sig.take() else {
            let data_bearing = attr.is_some_and(|attr| {
                matches!(
                    attr.ftype,
                    FileType::Regular | FileType::RegularEmpty | FileType::RawDevice
                )
            });
            if data_bearing {
                error!(file = %self.state.out_path.display(), "missing cryptographic signature");
                self.jcr.add_error();
            }
            return;
        };

        let Some(keypair) = self.jcr.config.keypair.as_ref() else {
            error!("no keypair available to verify signature");
            self.jcr.add_error();
            return;
        };

        let computed = if sig.digest_kind == self.jcr.config.signing_digest {
            self.state.signing_digest.take().map(FileDigest::finalize)
        } else {
            None
        };
        let re_readable = attr.is_some_and(|attr| {
            matches!(attr.ftype, FileType::Regular | FileType::RegularEmpty)
        });
        let digest = match computed {
            Some(digest) => digest,
            None if re_readable => match hash_file(&self.state.out_path, sig.digest_kind) {
                Some(digest) => digest,
                None => {
                    error!(file = %self.state.out_path.display(), "digest one file failed");
                    self.jcr.add_error();
                    return;
                }
            },
            None => return,
        };

        let public = keypair.public();
        if !sig.signed_by(&public) {
            error!(file = %self.state.out_path.display(), "signer not found, signature not verified");
            self.jcr.add_error();
            return;
        }
        if let Err(err) = sig.verify(&public, &digest) {
            error!(%err, file = %self.state.out_path.display(), "signature validation failed");
            self.jcr.add_error();
        } else {
            debug!(file = %self.state.out_path.display(), "signature good");
        }
    }
}

fn mtime_of(meta: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    meta.mtime()
}

fn remove_any(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(_) => std::fs::remove_dir(path),
    }
}

fn fork_path_of(path: &Path) -> PathBuf {
    path.join("..namedfork/rsrc")
}

fn hash_file(path: &Path, kind: DigestKind) -> Option<Vec<u8>> {
    let mut file = File::open(path).ok()?;
    let mut digest = FileDigest::new(kind);
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match file.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => digest.update(&buf[..read]),
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => return None,
        }
    }
    Some(digest.finalize())
}

enum ExtractError {
    /// Abandon the current file and keep restoring.
    Abandon(String),
    /// Terminate the restore.
    Fatal(EngineError),
}

/// One write target for the shared extract path.
struct ForkWrite<'f>(&'f mut File);

impl ForkWrite<'_> {
    fn write_block(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.0.write_all(data)
    }
}

/// Runs the inverse transform chain over one received data record.
#[allow(clippy::too_many_arguments)]
fn extract_into(
    jcr: &JobContext,
    inflater: &mut BlockInflater,
    scratch: &mut Vec<u8>,
    filter: &mut PortableFilter,
    out: &mut Output,
    file_addr: &mut u64,
    flags: ExtractFlags,
    cipher: &mut FileCipher,
    signing: &mut Option<FileDigest>,
    payload: &[u8],
    path: &Path,
) -> Result<(), ExtractError> {
    jcr.counters
        .bytes_read
        .fetch_add(payload.len() as u64, Ordering::Relaxed);

    let packet;
    let mut wbuf: &[u8] = payload;
    if flags.encrypted {
        let Some(ctx) = cipher.ctx.as_mut() else {
            return Err(ExtractError::Abandon("decryption context missing".to_owned()));
        };
        let plain = cipher.packets.as_mut_vec();
        ctx.update(payload, plain);
        match cipher.packets.take_packet() {
            // No full framed packet available yet, read more data.
            None => return Ok(()),
            Some(taken) => {
                packet = taken;
                wbuf = &packet;
            }
        }
    }

    write_plain(
        jcr, inflater, scratch, filter, out, file_addr, flags, signing, wbuf, path,
    )
}

/// Sparse seek, decompress, decompose, and write one plaintext block.
#[allow(clippy::too_many_arguments)]
fn write_plain<'a>(
    jcr: &JobContext,
    inflater: &mut BlockInflater,
    scratch: &'a mut Vec<u8>,
    filter: &mut PortableFilter,
    out: &mut Output,
    file_addr: &mut u64,
    flags: ExtractFlags,
    signing: &mut Option<FileDigest>,
    mut wbuf: &'a [u8],
    path: &Path,
) -> Result<(), ExtractError> {
    if flags.sparse {
        if wbuf.len() < ADDR_HEADER {
            return Err(ExtractError::Abandon(
                "sparse record shorter than its address header".to_owned(),
            ));
        }
        let addr = u64::from_be_bytes([
            wbuf[0], wbuf[1], wbuf[2], wbuf[3], wbuf[4], wbuf[5], wbuf[6], wbuf[7],
        ]);
        if addr != *file_addr {
            if let Err(err) = out.seek_to(addr) {
                return Err(ExtractError::Abandon(format!("seek to {addr} error: {err}")));
            }
            *file_addr = addr;
        }
        wbuf = &wbuf[ADDR_HEADER..];
    }

    if let Some(comp_stream) = flags.compress {
        if comp_stream.is_block_compressed() {
            match FramedBlockCodec::decompress_block(wbuf, scratch) {
                Ok(()) => {}
                Err(err @ FrameError::BadVersion { .. }) => {
                    return Err(ExtractError::Fatal(EngineError::Frame(err)));
                }
                Err(err) => return Err(ExtractError::Abandon(err.to_string())),
            }
        } else if let Err(err) = inflater.decompress_block(wbuf, scratch) {
            return Err(ExtractError::Abandon(err.to_string()));
        }
        wbuf = scratch;
    }

    if let Some(signing) = signing.as_mut() {
        signing.update(wbuf);
    }

    let write_result = if flags.win32_decomp {
        let mut raw = wbuf;
        let mut result = Ok(());
        while let Some(data) = filter.next_data(&mut raw) {
            if let Err(err) = out.write_block(data) {
                result = Err(err);
                break;
            }
        }
        result
    } else {
        out.write_block(wbuf)
    };

    if let Err(err) = write_result {
        // Directory-root targets cannot be rewritten; that is only worth a
        // warning.
        let text = path.to_string_lossy();
        if text.ends_with('/') || text.ends_with(':') {
            warn!(%err, path = %path.display(), "write skipped on directory target");
        } else {
            return Err(ExtractError::Abandon(format!("write error: {err}")));
        }
    }

    jcr.counters
        .bytes_sent
        .fetch_add(wbuf.len() as u64, Ordering::Relaxed);
    *file_addr += wbuf.len() as u64;
    Ok(())
}

/// Flushes the remaining buffered cipher data of the primary stream.
#[allow(clippy::too_many_arguments)]
fn flush_main_cipher(
    jcr: &JobContext,
    inflater: &mut BlockInflater,
    scratch: &mut Vec<u8>,
    filter: &mut PortableFilter,
    out: &mut Output,
    file_addr: &mut u64,
    flags: ExtractFlags,
    cipher: &mut FileCipher,
    signing: &mut Option<FileDigest>,
    path: &Path,
) {
    let Some(ctx) = cipher.ctx.take() else {
        return;
    };
    {
        let plain = cipher.packets.as_mut_vec();
        if let Err(err) = ctx.finalize(plain) {
            warn!(%err, file = %path.display(), "decryption error while flushing");
        }
    }

    // The sender emits one framed packet per block; at most one extra
    // packet can be buffered behind it, so two passes drain everything.
    for _ in 0..2 {
        let Some(packet) = cipher.packets.take_packet() else {
            break;
        };
        match write_plain(
            jcr, inflater, scratch, filter, out, file_addr, flags, signing, &packet, path,
        ) {
            Ok(()) => {}
            Err(ExtractError::Abandon(message)) => {
                warn!(file = %path.display(), "{message}");
                jcr.add_error();
                break;
            }
            Err(ExtractError::Fatal(err)) => {
                warn!(%err, file = %path.display(), "error while flushing cipher");
                jcr.add_error();
                break;
            }
        }
    }
    cipher.packets.clear();
}

/// Writes one fork record through decrypt and write (forks are never
/// compressed or sparse).
fn extract_fork(
    jcr: &JobContext,
    out: &mut ForkWrite<'_>,
    fork_addr: &mut u64,
    flags: ExtractFlags,
    cipher: &mut FileCipher,
    signing: &mut Option<FileDigest>,
    payload: &[u8],
) -> Result<(), String> {
    jcr.counters
        .bytes_read
        .fetch_add(payload.len() as u64, Ordering::Relaxed);

    let packet;
    let mut wbuf: &[u8] = payload;
    if flags.encrypted {
        let Some(ctx) = cipher.ctx.as_mut() else {
            return Err("decryption context missing".to_owned());
        };
        let plain = cipher.packets.as_mut_vec();
        ctx.update(payload, plain);
        match cipher.packets.take_packet() {
            None => return Ok(()),
            Some(taken) => {
                packet = taken;
                wbuf = &packet;
            }
        }
    }

    if let Some(signing) = signing.as_mut() {
        signing.update(wbuf);
    }
    out.write_block(wbuf)
        .map_err(|err| format!("write error on resource fork: {err}"))?;
    jcr.counters
        .bytes_sent
        .fetch_add(wbuf.len() as u64, Ordering::Relaxed);
    *fork_addr += wbuf.len() as u64;
    Ok(())
}

/// Flushes the remaining buffered cipher data of the fork stream.
fn flush_fork_cipher(
    jcr: &JobContext,
    out: &mut ForkWrite<'_>,
    fork_addr: &mut u64,
    _flags: ExtractFlags,
    cipher: &mut FileCipher,
    signing: &mut Option<FileDigest>,
) {
    let Some(ctx) = cipher.ctx.take() else {
        return;
    };
    {
        let plain = cipher.packets.as_mut_vec();
        if let Err(err) = ctx.finalize(plain) {
            warn!(%err, "decryption error while flushing resource fork");
        }
    }
    for _ in 0..2 {
        let Some(packet) = cipher.packets.take_packet() else {
            break;
        };
        if let Some(signing) = signing.as_mut() {
            signing.update(&packet);
        }
        if let Err(err) = out.write_block(&packet) {
            warn!(%err, "write error while flushing resource fork");
            jcr.add_error();
            break;
        }
        *fork_addr += packet.len() as u64;
    }
    cipher.packets.clear();
}
