//! Transactional store abstraction.
//!
//! The governance layer never talks to a database directly. It drives any
//! backend that can begin a unit of work scoped to a [`Context`] and later
//! commit or roll it back.
//!
//! # Usage
//!
//! ```
//! use txgov::context::Context;
//! use txgov::store::{MemoryStore, StoreTransaction, TransactionalStore};
//!
//! let store = MemoryStore::new();
//! let mut tx = store.begin(&Context::background()).unwrap();
//! tx.put("users/1", serde_json::json!({"name": "Alice"})).unwrap();
//! tx.commit().unwrap();
//!
//! assert!(store.read("users/1").is_some());
//! ```

mod error;
mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, MemoryStoreStats, MemoryTransaction};

use crate::context::Context;

/// An open unit of work inside a store.
///
/// Both terminal operations consume the transaction.
pub trait StoreTransaction: Send {
    /// Make the buffered work durable and visible.
    fn commit(self) -> StoreResult<()>;

    /// Discard the buffered work.
    fn rollback(self) -> StoreResult<()>;
}

/// A backend that can begin context-scoped transactions.
pub trait TransactionalStore: Send + Sync {
    /// The store's transaction object.
    type Tx: StoreTransaction;

    /// Begin a transaction scoped to `ctx`.
    ///
    /// May block while the backend acquires a connection or transaction slot.
    fn begin(&self, ctx: &Context) -> StoreResult<Self::Tx>;
}
