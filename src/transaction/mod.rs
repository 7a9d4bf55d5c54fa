//! Local transaction management.
//!
//! A [`TransactionManager`] opens handles against a
//! [`TransactionalStore`](crate::store::TransactionalStore). Each handle owns
//! a deadline-bound [`Context`](crate::context::Context) released exactly
//! once, when the handle commits, rolls back or is dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │   RetryManager ─▶ TransactionInterceptor ─▶ ...             │
//! │          (anything implementing Transactional)              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌───────────────────────┐      ┌─────────────────┐
//!                  │  TransactionManager   │◀─────│ TransactionPool │
//!                  └───────────────────────┘      └─────────────────┘
//!                              │
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │   Transaction<S>      │  TransactionStateMachine
//!                  │ (store tx + context)  │  tracks logical state
//!                  └───────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use std::time::Duration;
//! use txgov::context::Context;
//! use txgov::store::MemoryStore;
//! use txgov::transaction::{TransactionHandle, TransactionManager, Transactional};
//!
//! let store = MemoryStore::new();
//! let manager = TransactionManager::new(store.clone(), Duration::from_secs(5));
//!
//! manager
//!     .with_transaction(&Context::background(), |tx| {
//!         let store_tx = tx.underlying_mut().expect("open handle");
//!         store_tx.put("users/1", serde_json::json!({"name": "Alice"}))?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert!(store.read("users/1").is_some());
//! ```

mod error;
mod handle;
mod interceptor;
mod manager;
mod pool;
mod retry;
mod state;

pub use error::{BoxError, TransactionError, TransactionResult};
pub use handle::{Transaction, TransactionHandle, TransactionMetadata};
pub use interceptor::{tracing_logger, InterceptedTransaction, TransactionInterceptor, TxLogger};
pub use manager::{TransactionManager, Transactional, DEFAULT_TIMEOUT};
pub use pool::{PoolStats, TransactionPool, DEFAULT_POOL_SIZE};
pub use retry::{RetryClassifier, RetryManager};
pub use state::{
    StateCallback, StateTransition, TransactionState, TransactionStateMachine,
    DEFAULT_CALLBACK_QUEUE_CAPACITY,
};
