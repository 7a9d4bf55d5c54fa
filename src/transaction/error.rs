//! Transaction error types.

use thiserror::Error;

use crate::context::ContextError;
use crate::distributed::{DecisionLogError, ParticipantError};
use crate::store::StoreError;
use crate::transaction::state::TransactionState;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Boxed error raised by caller-supplied work inside a transaction.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// The store refused to start a transaction.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] StoreError),

    /// Store error while working inside, committing or rolling back a
    /// transaction.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The context scoping the operation is done.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// Commit or rollback was already called on this handle.
    #[error("transaction {tx_id} is already finished")]
    AlreadyFinished { tx_id: String },

    /// Caller-supplied work failed.
    #[error("transaction failed: {0}")]
    Execution(#[source] BoxError),

    /// The work failed and so did the rollback that followed.
    #[error("{error}, rollback failed: {rollback}")]
    RollbackFailed {
        error: Box<TransactionError>,
        rollback: Box<TransactionError>,
    },

    /// Out-of-order state machine move.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: TransactionState,
        to: TransactionState,
    },

    /// A participant voted no; the distributed transaction was aborted.
    #[error("prepare phase failed for {tx_id}: {source}")]
    PrepareFailed {
        tx_id: String,
        #[source]
        source: ParticipantError,
    },

    /// The local transaction failed after every participant prepared.
    #[error("local transaction failed for {tx_id}: {source}")]
    LocalFailed {
        tx_id: String,
        #[source]
        source: Box<TransactionError>,
    },

    /// Second-phase commit failed after the local transaction committed.
    /// Participants may now disagree and need external reconciliation.
    #[error("commit phase failed for {tx_id} ({failed} participant(s)): {source}")]
    CommitPhaseFailed {
        tx_id: String,
        failed: usize,
        #[source]
        source: ParticipantError,
    },

    /// Another `execute` or `recover` call owns this distributed transaction.
    #[error("distributed transaction {tx_id} is already in progress")]
    InProgress { tx_id: String },

    /// The coordinator could not record a decision.
    #[error("decision log error: {0}")]
    DecisionLog(#[from] DecisionLogError),

    /// Every allowed attempt failed.
    #[error("transaction failed after {attempts} attempt(s): {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<TransactionError>,
    },

    /// The pool was closed.
    #[error("transaction pool is closed")]
    PoolClosed,
}

impl TransactionError {
    /// Wrap an arbitrary error raised by caller-supplied work.
    pub fn execution(err: impl Into<BoxError>) -> Self {
        Self::Execution(err.into())
    }

    /// Check if this error is retryable.
    ///
    /// Transient store failures (conflicts, deadlocks, timeouts, slot
    /// exhaustion) and deadline expiry are retryable. Caller errors,
    /// cancellation and protocol failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::Begin(e) | TransactionError::Store(e) => e.is_transient(),
            TransactionError::Context(ContextError::DeadlineExceeded) => true,
            TransactionError::RollbackFailed { error, .. } => error.is_retryable(),
            _ => false,
        }
    }
}
