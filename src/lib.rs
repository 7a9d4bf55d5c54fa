//! txgov - transaction governance for pluggable stores
//!
//! This crate wraps any store that can begin, commit and roll back a unit of
//! work with deadline-bound handles, closure-scoped transactions, a handle
//! pool, a lifecycle state machine, logging interceptors, retry with backoff
//! and a two-phase commit coordinator.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use txgov::context::Context;
//! use txgov::distributed::{
//!     new_transaction_id, DistributedTransactionManager, ParticipantResult,
//!     TransactionParticipant,
//! };
//! use txgov::store::MemoryStore;
//! use txgov::transaction::{TransactionHandle, TransactionManager};
//!
//! struct Inventory;
//!
//! impl TransactionParticipant for Inventory {
//!     fn prepare(&self, _ctx: &Context, _tx_id: &str) -> ParticipantResult<()> {
//!         Ok(())
//!     }
//!     fn commit(&self, _ctx: &Context, _tx_id: &str) -> ParticipantResult<()> {
//!         Ok(())
//!     }
//!     fn rollback(&self, _ctx: &Context, _tx_id: &str) -> ParticipantResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! let store = MemoryStore::new();
//! let local = TransactionManager::new(store.clone(), Duration::from_secs(5));
//! let coordinator = DistributedTransactionManager::new(local);
//! coordinator.add_participant(Arc::new(Inventory));
//!
//! coordinator
//!     .execute(&Context::background(), &new_transaction_id(), |tx| {
//!         let orders = tx.underlying_mut().expect("open handle");
//!         orders.put("orders/1", serde_json::json!({"sku": "A-1", "qty": 2}))?;
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert!(store.read("orders/1").is_some());
//! ```

pub mod config;
pub mod context;
pub mod distributed;
pub mod store;
pub mod transaction;

#[cfg(test)]
mod testing;
