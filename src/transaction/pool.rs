//! Transaction pooling.
//!
//! Idle handles rest in a bounded queue. `get` takes one without blocking or
//! begins a fresh one; `put` returns a handle, committing it instead when the
//! queue is full.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::Mutex;

use crate::config::GovernanceConfig;
use crate::context::Context;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::handle::TransactionHandle;
use crate::transaction::manager::Transactional;

/// Default number of idle handles kept.
pub const DEFAULT_POOL_SIZE: usize = 16;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles resting in the queue.
    pub idle: usize,
    /// Handles checked out.
    pub active: usize,
}

/// Idle handles and the checked-out count, guarded together so `stats`
/// sees a consistent pair.
struct PoolState<T> {
    handles: VecDeque<T>,
    active: usize,
    closed: bool,
}

/// Pool of reusable transaction handles.
pub struct TransactionPool<M: Transactional> {
    manager: M,
    state: Mutex<PoolState<M::Tx>>,
    max_size: usize,
}

impl<M: Transactional> TransactionPool<M> {
    /// Create a pool that keeps at most `max_size` idle handles.
    pub fn new(manager: M, max_size: usize) -> Self {
        Self {
            manager,
            state: Mutex::new(PoolState {
                handles: VecDeque::with_capacity(max_size),
                active: 0,
                closed: false,
            }),
            max_size,
        }
    }

    /// Create a pool from configuration.
    pub fn from_config(manager: M, config: &GovernanceConfig) -> Self {
        Self::new(manager, config.pool_max_size)
    }

    /// The component handles are created from.
    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Maximum number of idle handles.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Take an idle handle, or begin a new one when none is available.
    pub fn get(&self, ctx: &Context) -> TransactionResult<M::Tx> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransactionError::PoolClosed);
            }
            if let Some(tx) = state.handles.pop_front() {
                state.active += 1;
                return Ok(tx);
            }
        }

        // Begin may block, so it runs outside the lock.
        let tx = self.manager.begin(ctx)?;
        self.state.lock().active += 1;
        Ok(tx)
    }

    /// Return a handle to the pool.
    ///
    /// A finished handle is discarded. When the queue is full (or the pool is
    /// closed) the handle is committed instead; the commit error is returned.
    pub fn put(&self, tx: M::Tx) -> TransactionResult<()> {
        let overflow = {
            let mut state = self.state.lock();
            state.active = state.active.saturating_sub(1);
            if tx.is_finished() {
                drop(state);
                tracing::debug!(tx_id = %tx.id(), "discarding finished transaction");
                return Ok(());
            }
            if state.closed || state.handles.len() >= self.max_size {
                Some(tx)
            } else {
                state.handles.push_back(tx);
                None
            }
        };

        match overflow {
            Some(mut tx) => {
                tracing::debug!(tx_id = %tx.id(), "pool full, committing returned transaction");
                tx.commit()
            }
            None => Ok(()),
        }
    }

    /// Current idle and active counts, read together.
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            idle: state.handles.len(),
            active: state.active,
        }
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the pool and commit every idle handle.
    ///
    /// Every handle is attempted; the first commit error is returned.
    pub fn close(&self) -> TransactionResult<()> {
        let drained: Vec<M::Tx> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.handles.drain(..).collect()
        };

        let mut first_error = None;
        for mut tx in drained {
            if let Err(e) = tx.commit() {
                tracing::warn!(tx_id = %tx.id(), error = %e, "commit of pooled transaction failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl<M: Transactional> Drop for TransactionPool<M> {
    fn drop(&mut self) {
        if !self.is_closed() {
            if let Err(e) = self.close() {
                tracing::warn!(error = %e, "closing transaction pool on drop failed");
            }
        }
    }
}

impl<M: Transactional> fmt::Debug for TransactionPool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionPool")
            .field("max_size", &self.max_size)
            .field("stats", &self.stats())
            .finish()
    }
}
