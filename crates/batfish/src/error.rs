//! Error types for the client.
//!
//! Everything the library can fail with is one of the variants below.
//! Validation failures are raised before any network traffic; job failures
//! embed the terminal status and the serialized work item so the caller can
//! diagnose without reaching for the coordinator logs.

use crate::work::WorkStatus;

/// Error type for all client operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Parameter values or names failed validation. Raised before any
    /// network call; the message contains one line per violation.
    #[error("invalid input:\n{0}")]
    Validation(String),

    /// The coordinator was unreachable after exhausting the retry policy.
    #[error("could not reach coordinator: {0}")]
    Connection(String),

    /// The coordinator answered, but with a failure or malformed envelope.
    #[error("coordinator request failed: {0}")]
    Submission(String),

    /// A work item reached a terminal state other than normal completion.
    #[error("work finished with status {status}: {work_item}")]
    JobFailed {
        status: WorkStatus,
        work_item: String,
    },

    /// A backend payload was missing structure the client must interpret.
    #[error("malformed payload: {0}")]
    Deserialization(String),

    /// The caller interrupted a foreground poll; remote cancellation was
    /// attempted before this was raised.
    #[error("interrupted while waiting for work to finish")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
