//! Logging decorator for transaction-capable components.
//!
//! [`TransactionInterceptor`] wraps any [`Transactional`] and reports begin,
//! completion, elapsed time and outcome through an injected logger. Handles
//! it returns are wrapped too, so direct `commit`/`rollback` calls are
//! reported. Interceptors stack: wrapping an interceptor adds another layer
//! of logging and nothing else.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::context::Context;
use crate::transaction::error::TransactionResult;
use crate::transaction::handle::TransactionHandle;
use crate::transaction::manager::Transactional;

/// Logging sink used by the interceptor.
pub type TxLogger = Arc<dyn Fn(fmt::Arguments<'_>) + Send + Sync>;

/// A logger that forwards every message to `tracing` at info level.
pub fn tracing_logger() -> TxLogger {
    Arc::new(|args: fmt::Arguments<'_>| {
        tracing::info!(target: "txgov::interceptor", "{}", args);
    })
}

/// Decorator adding timing and outcome logging around a [`Transactional`].
pub struct TransactionInterceptor<M> {
    next: M,
    logger: TxLogger,
}

impl<M: Transactional> TransactionInterceptor<M> {
    /// Wrap `next`, reporting through `logger`.
    pub fn new(next: M, logger: TxLogger) -> Self {
        Self { next, logger }
    }

    /// Wrap `next`, reporting through `tracing`.
    pub fn with_tracing(next: M) -> Self {
        Self::new(next, tracing_logger())
    }

    /// The wrapped component.
    pub fn inner(&self) -> &M {
        &self.next
    }
}

impl<M: Transactional> Transactional for TransactionInterceptor<M> {
    type Tx = InterceptedTransaction<M::Tx>;

    fn begin(&self, ctx: &Context) -> TransactionResult<Self::Tx> {
        (self.logger)(format_args!("Beginning transaction"));
        let start = Instant::now();

        match self.next.begin(ctx) {
            Ok(tx) => {
                (self.logger)(format_args!(
                    "Transaction {} begun successfully in {:?}",
                    tx.id(),
                    start.elapsed()
                ));
                Ok(InterceptedTransaction {
                    inner: tx,
                    logger: Arc::clone(&self.logger),
                })
            }
            Err(e) => {
                (self.logger)(format_args!(
                    "Failed to begin transaction after {:?}: {}",
                    start.elapsed(),
                    e
                ));
                Err(e)
            }
        }
    }

    /// Logs the overall outcome and elapsed time around the standard
    /// begin/commit/rollback cycle.
    ///
    /// The cycle runs over this interceptor's own `begin`, not the wrapped
    /// component's `with_transaction`. When interceptors are stacked, inner
    /// layers therefore log begin, commit and rollback but not the
    /// "Executing transaction" and completion lines; only the outermost layer
    /// logs those.
    fn with_transaction<F, T>(&self, ctx: &Context, f: F) -> TransactionResult<T>
    where
        F: FnOnce(&mut Self::Tx) -> TransactionResult<T>,
    {
        (self.logger)(format_args!("Executing transaction"));
        let start = Instant::now();

        // Runs the standard begin/commit/rollback cycle over the wrapped
        // handles, so every step below is logged as well.
        let result = run_standard(self, ctx, f);
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => (self.logger)(format_args!(
                "Transaction completed successfully in {:?}",
                elapsed
            )),
            Err(e) => (self.logger)(format_args!(
                "Transaction failed after {:?}: {}",
                elapsed, e
            )),
        }
        result
    }
}

/// The trait's provided `with_transaction`, reachable from an override.
fn run_standard<M, F, T>(component: &M, ctx: &Context, f: F) -> TransactionResult<T>
where
    M: Transactional,
    F: FnOnce(&mut M::Tx) -> TransactionResult<T>,
{
    struct Standard<'a, M>(&'a M);

    impl<M: Transactional> Transactional for Standard<'_, M> {
        type Tx = M::Tx;

        fn begin(&self, ctx: &Context) -> TransactionResult<M::Tx> {
            self.0.begin(ctx)
        }
    }

    Standard(component).with_transaction(ctx, f)
}

impl<M> fmt::Debug for TransactionInterceptor<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionInterceptor").finish_non_exhaustive()
    }
}

/// A handle whose terminal calls are logged.
pub struct InterceptedTransaction<H> {
    inner: H,
    logger: TxLogger,
}

impl<H: TransactionHandle> InterceptedTransaction<H> {
    /// The wrapped handle.
    pub fn get_ref(&self) -> &H {
        &self.inner
    }

    /// Mutable access to the wrapped handle.
    pub fn get_mut(&mut self) -> &mut H {
        &mut self.inner
    }
}

impl<H: TransactionHandle> TransactionHandle for InterceptedTransaction<H> {
    type Inner = H::Inner;

    fn id(&self) -> &str {
        self.inner.id()
    }

    fn context(&self) -> &Context {
        self.inner.context()
    }

    fn commit(&mut self) -> TransactionResult<()> {
        (self.logger)(format_args!("Committing transaction {}", self.inner.id()));
        match self.inner.commit() {
            Ok(()) => {
                (self.logger)(format_args!("Transaction {} committed successfully", self.inner.id()));
                Ok(())
            }
            Err(e) => {
                (self.logger)(format_args!("Failed to commit transaction {}: {}", self.inner.id(), e));
                Err(e)
            }
        }
    }

    fn rollback(&mut self) -> TransactionResult<()> {
        (self.logger)(format_args!("Rolling back transaction {}", self.inner.id()));
        match self.inner.rollback() {
            Ok(()) => {
                (self.logger)(format_args!(
                    "Transaction {} rolled back successfully",
                    self.inner.id()
                ));
                Ok(())
            }
            Err(e) => {
                (self.logger)(format_args!(
                    "Failed to rollback transaction {}: {}",
                    self.inner.id(),
                    e
                ));
                Err(e)
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    fn underlying(&self) -> Option<&H::Inner> {
        self.inner.underlying()
    }

    fn underlying_mut(&mut self) -> Option<&mut H::Inner> {
        self.inner.underlying_mut()
    }
}

impl<H: TransactionHandle> fmt::Debug for InterceptedTransaction<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedTransaction")
            .field("tx_id", &self.inner.id())
            .finish()
    }
}
