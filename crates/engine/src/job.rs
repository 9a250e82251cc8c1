//! Per-job shared state.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use checksums::DigestKind;
use crypto::{CipherSpec, Keypair, RecipientKey};
use flist::FileType;

/// Restore policy applied per existing target file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Replace the target unconditionally.
    #[default]
    Always,
    /// Replace only when the archived file is newer than the target.
    IfNewer,
    /// Replace only when the archived file is older than the target.
    IfOlder,
    /// Never touch an existing target.
    Never,
}

/// Final status of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Completed without errors.
    Terminated,
    /// Completed, but file-scoped errors were counted.
    Warnings,
    /// Terminated by a non-network fatal error.
    ErrorTerminated,
    /// Terminated by a link or setup failure.
    FatalError,
    /// Cancelled by the operator.
    Canceled,
    /// Interrupted with the intent to resume.
    Incomplete,
}

/// Static job parameters decided before the pipeline starts.
#[derive(Clone, Debug)]
pub struct JobConfig {
    /// Read/write block size of the data phase.
    pub read_block_size: usize,
    /// Restore replace policy.
    pub replace: ReplaceMode,
    /// Prefix restored files are rooted under, `None` for in-place restore.
    pub restore_prefix: Option<PathBuf>,
    /// Job-wide signing digest algorithm.
    pub signing_digest: DigestKind,
    /// Emit signature records.
    pub sign: bool,
    /// Encrypt file data.
    pub encrypt: bool,
    /// Session cipher used when encrypting.
    pub cipher: CipherSpec,
    /// This agent's keypair (session unwrap, signatures).
    pub keypair: Option<Keypair>,
    /// Recipients allowed to decrypt the job.
    pub recipients: Vec<RecipientKey>,
    /// Watchdog for FIFO sources.
    pub fifo_read_timeout: Duration,
    /// Heartbeat/progress cadence.
    pub progress_interval: Duration,
    /// Insanity cap on accumulated file-scoped errors.
    pub max_job_errors: u32,
    /// Verify received digest records against the restored bytes.
    pub verify_digests: bool,
    /// Source delivers the OS-native multi-stream layout.
    pub native_layout: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            read_block_size: 64 * 1024,
            replace: ReplaceMode::Always,
            restore_prefix: None,
            signing_digest: DigestKind::Sha256,
            sign: false,
            encrypt: false,
            cipher: CipherSpec::Aes256Cbc,
            keypair: None,
            recipients: Vec::new(),
            fifo_read_timeout: Duration::from_secs(60),
            progress_interval: Duration::from_secs(30),
            max_job_errors: 1000,
            verify_digests: true,
            native_layout: false,
        }
    }
}

/// Job counters, atomics so the heartbeat can read them without locking.
#[derive(Debug, Default)]
pub struct JobCounters {
    /// Entries seen by the pipeline.
    pub files_examined: AtomicU64,
    /// Files whose attribute record was emitted (backup) or whose target
    /// was handled (restore). The post-increment value is the file index.
    pub files_sent: AtomicU32,
    /// Bytes handed to the link, after transforms.
    pub bytes_sent: AtomicU64,
    /// Plaintext bytes read from sources (backup) or records (restore).
    pub bytes_read: AtomicU64,
    /// File-scoped errors.
    pub job_errors: AtomicU32,
}

#[derive(Debug, Default)]
struct LastFile {
    name: String,
    ftype: Option<FileType>,
}

/// Point-in-time progress view published by the heartbeat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Entries seen.
    pub files_examined: u64,
    /// Files handled.
    pub files_sent: u32,
    /// Bytes on the wire.
    pub bytes_sent: u64,
    /// Bytes read.
    pub bytes_read: u64,
    /// File-scoped errors.
    pub job_errors: u32,
    /// File most recently worked on.
    pub current_file: String,
}

/// Shared per-job state.
///
/// Counters are atomic; the last filename sits behind a lock because the
/// heartbeat reads it while the control thread replaces it.
#[derive(Debug)]
pub struct JobContext {
    /// Static configuration.
    pub config: JobConfig,
    /// Live counters.
    pub counters: JobCounters,
    last_file: Mutex<LastFile>,
    cancel: AtomicBool,
}

impl JobContext {
    /// Creates the context for one job.
    #[must_use]
    pub fn new(config: JobConfig) -> Self {
        Self {
            config,
            counters: JobCounters::default(),
            last_file: Mutex::new(LastFile::default()),
            cancel: AtomicBool::new(false),
        }
    }

    /// Requests cancellation; the pipelines poll this between records.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Records the file currently being worked on.
    pub fn set_last_file(&self, name: &str, ftype: FileType) {
        let mut last = self.last_file.lock().expect("last_file lock");
        last.name.clear();
        last.name.push_str(name);
        last.ftype = Some(ftype);
    }

    /// Name of the file currently being worked on.
    #[must_use]
    pub fn last_file_name(&self) -> String {
        self.last_file.lock().expect("last_file lock").name.clone()
    }

    /// Classification of the file currently being worked on.
    #[must_use]
    pub fn last_file_type(&self) -> Option<FileType> {
        self.last_file.lock().expect("last_file lock").ftype
    }

    /// Counts one file-scoped error, returning the new total.
    pub fn add_error(&self) -> u32 {
        self.counters.job_errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current error total.
    #[must_use]
    pub fn errors(&self) -> u32 {
        self.counters.job_errors.load(Ordering::Relaxed)
    }

    /// Takes the next file index (post-increment of `files_sent`).
    pub fn next_file_index(&self) -> u32 {
        self.counters.files_sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Publishes a progress snapshot.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            files_examined: self.counters.files_examined.load(Ordering::Relaxed),
            files_sent: self.counters.files_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            bytes_read: self.counters.bytes_read.load(Ordering::Relaxed),
            job_errors: self.counters.job_errors.load(Ordering::Relaxed),
            current_file: self.last_file_name(),
        }
    }

    /// Resolves the final status of a cleanly finished job.
    #[must_use]
    pub fn finish_status(&self) -> JobStatus {
        if self.errors() > 0 {
            JobStatus::Warnings
        } else {
            JobStatus::Terminated
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_index_is_the_post_increment_count() {
        let jcr = JobContext::new(JobConfig::default());
        assert_eq!(jcr.next_file_index(), 1);
        assert_eq!(jcr.next_file_index(), 2);
        assert_eq!(jcr.counters.files_sent.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn cancellation_is_sticky() {
        let jcr = JobContext::new(JobConfig::default());
        assert!(!jcr.is_canceled());
        jcr.cancel();
        assert!(jcr.is_canceled());
        assert!(jcr.is_canceled());
    }

    #[test]
    fn snapshot_reflects_counters_and_last_file() {
        let jcr = JobContext::new(JobConfig::default());
        jcr.counters.bytes_sent.store(77, Ordering::Relaxed);
        jcr.set_last_file("/a/b", FileType::Regular);

        let snapshot = jcr.snapshot();
        assert_eq!(snapshot.bytes_sent, 77);
        assert_eq!(snapshot.current_file, "/a/b");
        assert_eq!(jcr.last_file_type(), Some(FileType::Regular));
    }

    #[test]
    fn finish_status_depends_on_error_count() {
        let jcr = JobContext::new(JobConfig::default());
        assert_eq!(jcr.finish_status(), JobStatus::Terminated);
        jcr.add_error();
        assert_eq!(jcr.finish_status(), JobStatus::Warnings);
    }
}
