//! Fatal error taxonomy of the pipelines.
//!
//! Only job-fatal conditions travel as `Err`; file-scoped problems are
//! counted on the job and handled in place, so a pipeline function that
//! returns `Ok` may still have skipped files.

use compress::{FrameError, ZlibError};
use crypto::CryptoError;
use flist::SelectError;
use protocol::LinkError;

/// Conditions that terminate a job.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The record link failed; nothing further can be sent or received.
    #[error(transparent)]
    Link(#[from] LinkError),
    /// No data stream exists for an entry's option tuple.
    #[error(transparent)]
    Select(#[from] SelectError),
    /// Compression setup or a per-block compression step failed.
    #[error(transparent)]
    Compress(#[from] ZlibError),
    /// A framed compression header failed validation.
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// Cipher or session setup failed, or padding did not flush.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    /// An attribute record did not parse.
    #[error("attribute record error: {0}")]
    Attributes(#[from] flist::AttrError),
    /// Encryption was requested with an address-prefixed stream.
    #[error("encrypting sparse or offset data not supported")]
    EncryptedSparse,
    /// Encryption was requested without recipients or session.
    #[error("encryption enabled but no recipient keys are configured")]
    NoRecipients,
    /// The accumulated error count passed the insanity cap.
    #[error("too many errors ({0})")]
    TooManyErrors(u32),
    /// The job was cancelled.
    #[error("job canceled by user")]
    Canceled,
    /// A metadata backend reported a job-fatal condition.
    #[error("metadata backend failure: {0}")]
    Metadata(String),
}
