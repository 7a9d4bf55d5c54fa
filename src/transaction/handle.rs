//! Transaction handles.
//!
//! A [`Transaction`] pairs an open store transaction with the deadline-bound
//! context it runs under. Exactly one of `commit`/`rollback` finishes it;
//! either way the context is cancelled and the handle leaves the manager's
//! active set. A second terminal call reports
//! [`TransactionError::AlreadyFinished`] and never reaches the store.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::context::{CancelHandle, Context};
use crate::store::{StoreResult, StoreTransaction, TransactionalStore};
use crate::transaction::error::{TransactionError, TransactionResult};

/// Live handles tracked by ID.
pub(crate) type ActiveRegistry = Arc<RwLock<HashMap<String, TransactionMetadata>>>;

/// Common surface of every transaction handle.
pub trait TransactionHandle: Send {
    /// The store-level object behind the handle.
    type Inner;

    /// Unique transaction ID.
    fn id(&self) -> &str;

    /// The deadline-bound context the transaction runs under.
    fn context(&self) -> &Context;

    /// Commit and release the handle.
    fn commit(&mut self) -> TransactionResult<()>;

    /// Roll back and release the handle.
    fn rollback(&mut self) -> TransactionResult<()>;

    /// Whether `commit` or `rollback` has already been called.
    fn is_finished(&self) -> bool;

    /// The underlying store transaction, while the handle is open.
    fn underlying(&self) -> Option<&Self::Inner>;

    /// Mutable access to the underlying store transaction.
    fn underlying_mut(&mut self) -> Option<&mut Self::Inner>;
}

/// Transaction metadata stored in the manager.
#[derive(Debug, Clone)]
pub struct TransactionMetadata {
    /// Unique transaction ID.
    pub tx_id: String,
    /// When the transaction started.
    pub started_at: DateTime<Utc>,
    /// Timeout applied to the transaction's context.
    pub timeout: Duration,
}

/// A handle on one open unit of work.
///
/// Owned by whoever called `begin`. Dropping an unfinished handle rolls it
/// back.
pub struct Transaction<S: TransactionalStore> {
    metadata: TransactionMetadata,
    tx: Option<S::Tx>,
    ctx: Context,
    cancel: CancelHandle,
    registry: ActiveRegistry,
}

/// Cancels the context and unregisters the handle when dropped, so release
/// happens even if the store call unwinds.
struct Release<'a> {
    cancel: &'a CancelHandle,
    registry: &'a ActiveRegistry,
    tx_id: &'a str,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.write().remove(self.tx_id);
    }
}

impl<S: TransactionalStore> Transaction<S> {
    pub(crate) fn new(
        metadata: TransactionMetadata,
        tx: S::Tx,
        ctx: Context,
        cancel: CancelHandle,
        registry: ActiveRegistry,
    ) -> Self {
        Self {
            metadata,
            tx: Some(tx),
            ctx,
            cancel,
            registry,
        }
    }

    /// Get the transaction metadata.
    pub fn metadata(&self) -> &TransactionMetadata {
        &self.metadata
    }

    fn finish_with<F>(&mut self, op: F) -> TransactionResult<()>
    where
        F: FnOnce(S::Tx) -> StoreResult<()>,
    {
        let tx = self.tx.take().ok_or_else(|| TransactionError::AlreadyFinished {
            tx_id: self.metadata.tx_id.clone(),
        })?;

        let _release = Release {
            cancel: &self.cancel,
            registry: &self.registry,
            tx_id: &self.metadata.tx_id,
        };
        op(tx).map_err(TransactionError::Store)
    }
}

impl<S: TransactionalStore> TransactionHandle for Transaction<S> {
    type Inner = S::Tx;

    fn id(&self) -> &str {
        &self.metadata.tx_id
    }

    fn context(&self) -> &Context {
        &self.ctx
    }

    fn commit(&mut self) -> TransactionResult<()> {
        self.finish_with(StoreTransaction::commit)
    }

    fn rollback(&mut self) -> TransactionResult<()> {
        self.finish_with(StoreTransaction::rollback)
    }

    fn is_finished(&self) -> bool {
        self.tx.is_none()
    }

    fn underlying(&self) -> Option<&S::Tx> {
        self.tx.as_ref()
    }

    fn underlying_mut(&mut self) -> Option<&mut S::Tx> {
        self.tx.as_mut()
    }
}

impl<S: TransactionalStore> Drop for Transaction<S> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(
                tx_id = %self.metadata.tx_id,
                "transaction dropped while open, rolling back"
            );
            if let Err(e) = self.rollback() {
                tracing::warn!(tx_id = %self.metadata.tx_id, error = %e, "implicit rollback failed");
            }
        }
    }
}

impl<S: TransactionalStore> fmt::Debug for Transaction<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("tx_id", &self.metadata.tx_id)
            .field("started_at", &self.metadata.started_at)
            .field("finished", &self.is_finished())
            .finish()
    }
}
