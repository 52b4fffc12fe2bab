//! Structured error types for sync-prof.
//!
//! Using thiserror for automatic Display implementation and error chaining.

use thiserror::Error;

use super::types::ThreadId;

/// Fatal model errors — each one indicates a violated invariant in the
/// stream of driver notifications (a corrupt trace, a buggy driver, or a
/// target whose control flow the nesting assumption doesn't hold for).
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("pop/top on an empty stack")]
    StackEmpty,

    #[error("event {0} is not on top of thread {1}'s event stack")]
    NestingBroken(String, ThreadId),

    #[error("unlock argument does not match the held lock on thread {0}")]
    LockMismatch(ThreadId),

    #[error("event {0} is already finished")]
    AlreadyFinished(String),

    #[error("event {0} is already aborted")]
    AlreadyAborted(String),

    #[error("pthread_join target {0} matched {1} threads, expected exactly 1")]
    JoinTargetAmbiguous(String, usize),

    #[error(transparent)]
    View(#[from] ViewError),
}

/// Errors produced by a [`crate::view::View`] implementation.
#[derive(Error, Debug)]
pub enum ViewError {
    #[error("group start_thread {0} does not match stop_thread {1}")]
    GroupThreadMismatch(ThreadId, ThreadId),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Errors produced while parsing the opaque-event configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
