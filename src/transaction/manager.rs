//! Transaction manager - opens handles against a store.
//!
//! The TransactionManager is the main entry point for local transactions.
//! It handles:
//! - Deriving a deadline-bound context for every handle
//! - Beginning store transactions under that context
//! - Tracking live handles
//! - Running closures with automatic commit/rollback (`with_transaction`)

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use ulid::Ulid;

use crate::config::GovernanceConfig;
use crate::context::Context;
use crate::store::TransactionalStore;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::handle::{
    ActiveRegistry, Transaction, TransactionHandle, TransactionMetadata,
};

/// Timeout applied to handles when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A component that can open transaction handles.
///
/// Implemented by [`TransactionManager`] and by decorators such as
/// [`TransactionInterceptor`](crate::transaction::TransactionInterceptor), so
/// pools, retry and the distributed coordinator work with any of them.
pub trait Transactional: Send + Sync {
    /// The handle type this component hands out.
    type Tx: TransactionHandle;

    /// Begin a new transaction derived from `ctx`.
    fn begin(&self, ctx: &Context) -> TransactionResult<Self::Tx>;

    /// Execute a function within a transaction, automatically committing or
    /// rolling back.
    ///
    /// - `Ok` from `f` commits; the commit's own error (if any) is returned.
    /// - `Err` from `f` rolls back and returns the original error, combined
    ///   with the rollback error if the rollback also failed.
    /// - A panic in `f` rolls back and then resumes the panic unchanged.
    ///
    /// If `f` finished the handle itself, an `Err` is returned as-is and an
    /// `Ok` surfaces the handle's `AlreadyFinished` error.
    fn with_transaction<F, T>(&self, ctx: &Context, f: F) -> TransactionResult<T>
    where
        F: FnOnce(&mut Self::Tx) -> TransactionResult<T>,
    {
        let mut tx = self.begin(ctx)?;

        match panic::catch_unwind(AssertUnwindSafe(|| f(&mut tx))) {
            Ok(Ok(value)) => {
                tx.commit()?;
                Ok(value)
            }
            Ok(Err(err)) => {
                if tx.is_finished() {
                    return Err(err);
                }
                match tx.rollback() {
                    Ok(()) => Err(err),
                    Err(rollback) => Err(TransactionError::RollbackFailed {
                        error: Box::new(err),
                        rollback: Box::new(rollback),
                    }),
                }
            }
            Err(payload) => {
                if !tx.is_finished() {
                    if let Err(e) = tx.rollback() {
                        tracing::warn!(tx_id = %tx.id(), error = %e, "rollback after panic failed");
                    }
                }
                panic::resume_unwind(payload)
            }
        }
    }
}

/// Transaction manager - opens handles against a store.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
pub struct TransactionManager<S: TransactionalStore> {
    inner: Arc<TransactionManagerInner<S>>,
}

struct TransactionManagerInner<S> {
    /// The underlying store.
    store: S,
    /// Timeout applied to every handle's context.
    timeout: Duration,
    /// Live handles tracked by ID.
    active: ActiveRegistry,
}

impl<S: TransactionalStore> Clone for TransactionManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: TransactionalStore> TransactionManager<S> {
    /// Create a new transaction manager. A zero `timeout` selects
    /// [`DEFAULT_TIMEOUT`].
    pub fn new(store: S, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };

        Self {
            inner: Arc::new(TransactionManagerInner {
                store,
                timeout,
                active: Arc::new(RwLock::new(HashMap::new())),
            }),
        }
    }

    /// Create a transaction manager from configuration.
    pub fn from_config(store: S, config: &GovernanceConfig) -> Self {
        Self::new(store, config.transaction_timeout())
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Timeout applied to each handle.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Get the number of live handles.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// List all live transaction IDs.
    pub fn active_transactions(&self) -> Vec<String> {
        self.inner.active.read().keys().cloned().collect()
    }

    /// Check if a transaction is live.
    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.active.read().contains_key(tx_id)
    }

    /// Get metadata for a live transaction.
    pub fn transaction_info(&self, tx_id: &str) -> Option<TransactionMetadata> {
        self.inner.active.read().get(tx_id).cloned()
    }
}

impl<S: TransactionalStore> Transactional for TransactionManager<S> {
    type Tx = Transaction<S>;

    fn begin(&self, ctx: &Context) -> TransactionResult<Transaction<S>> {
        let (tx_ctx, cancel) = ctx.with_timeout(self.inner.timeout);

        let store_tx = match self.inner.store.begin(&tx_ctx) {
            Ok(tx) => tx,
            Err(e) => {
                cancel.cancel();
                tracing::debug!(error = %e, "store refused to begin transaction");
                return Err(TransactionError::Begin(e));
            }
        };

        let metadata = TransactionMetadata {
            tx_id: Ulid::new().to_string().to_lowercase(),
            started_at: chrono::Utc::now(),
            timeout: self.inner.timeout,
        };
        self.inner
            .active
            .write()
            .insert(metadata.tx_id.clone(), metadata.clone());
        tracing::debug!(tx_id = %metadata.tx_id, "transaction begun");

        Ok(Transaction::new(
            metadata,
            store_tx,
            tx_ctx,
            cancel,
            Arc::clone(&self.inner.active),
        ))
    }
}

impl<S: TransactionalStore> fmt::Debug for TransactionManager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionManager")
            .field("timeout", &self.inner.timeout)
            .field("active_count", &self.active_count())
            .finish()
    }
}
