//! Error Handling
//!
//! This module provides the error types shared by the graph splitter and the
//! instruction-level cloner, using `thiserror`. All error variants are marked
//! with `#[cold]` where they sit behind a `From` impl, to help the optimizer
//! place error-handling code in cold paths.
//!
//! # Error Categories
//! - **Graph errors**: malformed digraphs handed to the splitter
//! - **Invariant errors**: the splitter or cloner detected its own bookkeeping
//!   drifting from the underlying graph (the defense against a buggy
//!   duplication callback)
//! - **Method errors**: CFG construction, try-catch range violations
//! - **Termination errors**: the method is still irreducible after a clone pass

use thiserror::Error;

/// Errors produced by the generic splitter and the JVM instruction cloner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoopSplitError {
    /// A region-graph edge no longer matches the underlying vertex edges
    /// after a T3 step. Indicates a bug in the duplication callback (it
    /// failed to honor guarantee #1 or #2) or in the splitter itself.
    #[error("region/vertex edge mismatch after node split: {0}")]
    InvariantViolation(String),

    /// A try-catch entry no longer satisfies `start < end` after a clone
    /// pass rewired its boundaries.
    #[error("try-catch range invalid after split: start index {start} >= end index {end}")]
    InvalidTryCatchRange { start: usize, end: usize },

    /// A duplication callback referenced an anchor vertex that was never
    /// added to the graph and does not exist in the region splitter's
    /// membership map.
    #[error("duplication callback referenced unknown anchor vertex: {0}")]
    UnknownAnchor(String),

    /// The splitter made a second full pass over the method and still found
    /// regions with more than one predecessor. The method's control flow is
    /// irreducible even after node splitting, which should not happen for a
    /// well-formed `MethodSource`.
    #[error("method is still irreducible after node splitting: {0}")]
    StillIrreducible(String),

    /// The method's instruction list or try-catch table could not be read
    /// from the supplied `MethodSource`.
    #[error("method source error: {0}")]
    SourceError(String),

    /// A `TypeResolver` could not resolve a class needed for try-catch
    /// handler-type reasoning.
    #[error("type resolution error: {0}")]
    ResolveError(String),

    /// Verification of the transformed method body failed.
    #[error("verification failed: {0}")]
    VerificationFailed(String),
}

impl From<std::io::Error> for LoopSplitError {
    #[cold]
    fn from(err: std::io::Error) -> Self {
        LoopSplitError::SourceError(format!("IO error: {err}"))
    }
}
