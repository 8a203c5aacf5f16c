//! Driver Error Types
//!
//! Mirrors [`loopsplit_core::LoopSplitError`]'s shape: a `thiserror` enum
//! covering every way a single input file can fail, plus a cold `From<io::Error>`
//! so read/write failures collapse into the same reporting path as a
//! malformed classfile.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    /// The input isn't a well-formed `.class`/`.jar` (bad magic, truncated
    /// constant pool, unreadable `Code` attribute, ...).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The transformed method failed [`loopsplit_core::resolve::Verifier`].
    #[error("verifier rejected transformed method: {0}")]
    VerifierRejected(String),

    #[error(transparent)]
    Internal(#[from] loopsplit_core::LoopSplitError),
}

impl From<std::io::Error> for DriverError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        DriverError::MalformedInput(format!("IO error: {err}"))
    }
}

/// What happened to one input file.
pub enum FileOutcome {
    Transformed { methods_split: usize },
    Unchanged,
    Skipped { reason: String },
    Failed(DriverError),
}

impl FileOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failed(_))
    }
}
