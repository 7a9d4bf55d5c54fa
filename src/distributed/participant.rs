//! Participants in a distributed transaction.

use std::sync::Arc;

use thiserror::Error;

use crate::context::{Context, ContextError};

/// Result type for participant calls.
pub type ParticipantResult<T> = Result<T, ParticipantError>;

/// Errors reported by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParticipantError {
    /// The participant voted no or refused the request.
    #[error("participant rejected: {0}")]
    Rejected(String),

    /// The participant could not be reached.
    #[error("participant unavailable: {0}")]
    Unavailable(String),

    /// The participant does not know the transaction.
    #[error("unknown transaction: {0}")]
    UnknownTransaction(String),

    /// The context scoping the call is done.
    #[error("{0}")]
    Context(#[from] ContextError),
}

/// An external transactional collaborator driven through two-phase commit.
///
/// Implementations must make `commit` idempotent (recovery may repeat it)
/// and `rollback` a no-op for transactions they never prepared.
pub trait TransactionParticipant: Send + Sync {
    /// Name used in logs and in the decision log. Recovery finds
    /// participants by this name, so it should be unique per coordinator.
    fn name(&self) -> &str {
        "participant"
    }

    /// Phase 1: vote on `tx_id`. `Ok` promises that a later `commit` will
    /// succeed.
    fn prepare(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()>;

    /// Phase 2: make the prepared work permanent.
    fn commit(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()>;

    /// Discard any work for `tx_id`.
    fn rollback(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()>;
}

impl<P: TransactionParticipant + ?Sized> TransactionParticipant for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn prepare(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
        (**self).prepare(ctx, tx_id)
    }

    fn commit(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
        (**self).commit(ctx, tx_id)
    }

    fn rollback(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
        (**self).rollback(ctx, tx_id)
    }
}
