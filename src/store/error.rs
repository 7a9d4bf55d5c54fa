//! Store error types
//!
//! Errors surfaced by a transactional store when beginning, committing or
//! rolling back a unit of work.

use thiserror::Error;

use crate::context::ContextError;

/// the main error type for store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// no transaction slot is free (connection exhaustion)
    #[error("store exhausted: {open} of {max} transactions already open")]
    Exhausted { open: usize, max: usize },

    /// a key read by this transaction was changed by a concurrent commit
    #[error("write conflict on key {key}")]
    Conflict { key: String },

    /// the backend detected a deadlock and picked this transaction as victim
    #[error("deadlock detected")]
    Deadlock,

    /// the backend gave up waiting
    #[error("store operation timed out")]
    Timeout,

    /// the context scoping the operation is done
    #[error("context error: {0}")]
    Context(#[from] ContextError),

    /// any other backend failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// check if this error is transient, i.e. the same work may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Exhausted { .. }
                | StoreError::Conflict { .. }
                | StoreError::Deadlock
                | StoreError::Timeout
                | StoreError::Context(ContextError::DeadlineExceeded)
        )
    }
}

/// result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
