//! Error types for Bates endorsement and its dispatch layer.
//!
//! Every per-task failure is carried as an [`Error`] inside that task's
//! future, so the type is `Clone`: a shared future hands the same value to
//! every holder. Underlying OS and codec errors are flattened into their
//! message at the boundary where they occur.
//!
//! ## Error Cases
//! - `InvalidSequenceValue`: a Bates number would drop below 1.
//! - `SequenceExhausted`: a Bates number would pass `u64::MAX`.
//! - `ChannelTransport`: socket pair creation, send or receive failed.
//! - `ProcessSpawn`: `fork` failed.
//! - `ChildCrashed`: the worker exited without answering.
//! - `Annotation`: the annotator reported a failure through the channel.
//! - `FrameTooLarge`, `Codec`: the message did not fit the wire format.
//! - `Timeout`: the worker did not answer within the receive timeout.
//! - `PoolClosed`: the pool no longer admits submissions.
//! - `Discovery`: the input tree could not be walked.

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the endorsement pipeline.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A Bates number was constructed or decremented below 1.
    #[error("Invalid sequence value: {number} (must be greater than 0)")]
    InvalidSequenceValue { number: u64 },

    /// Incrementing a Bates number would overflow.
    #[error("Sequence exhausted: {number} has no successor")]
    SequenceExhausted { number: u64 },

    /// Creating, writing to or reading from the socket pair failed.
    #[error("Channel error: {context}")]
    ChannelTransport { context: String },

    /// The worker process could not be forked.
    #[error("Failed to spawn worker process: {context}")]
    ProcessSpawn { context: String },

    /// The worker closed its end of the channel without sending a response.
    #[error("Worker process crashed: {context}")]
    ChildCrashed { context: String },

    /// The annotator failed for this task.
    #[error("Annotation failed: {0}")]
    Annotation(#[from] AnnotationError),

    /// An encoded message exceeds the maximum frame size.
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    /// A message could not be encoded or decoded.
    #[error("Codec error: {context}")]
    Codec { context: String },

    /// The worker did not respond before the receive timeout elapsed.
    #[error("Worker did not respond within {millis}ms")]
    Timeout { millis: u128 },

    /// The pool has been closed to new submissions.
    #[error("Worker pool is closed")]
    PoolClosed,

    /// Walking the input directory failed.
    #[error("Discovery error: {context}")]
    Discovery { context: String },
}

/// Failure reported by an [`Annotator`](crate::Annotator).
///
/// Crosses the process boundary as text, so it only keeps the message and a
/// coarse kind.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum AnnotationError {
    /// The source could not be read.
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// The output could not be written.
    #[error("cannot write {path}: {reason}")]
    Unwritable { path: String, reason: String },

    /// The source was readable but its page structure is invalid.
    #[error("malformed image {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// Any other failure, including a panic inside the annotator.
    #[error("{0}")]
    Other(String),
}

impl From<nix::Error> for Error {
    fn from(err: nix::Error) -> Self {
        Self::ChannelTransport {
            context: err.desc().to_string(),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Self::Discovery {
            context: err.to_string(),
        }
    }
}
