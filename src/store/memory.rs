//! In-memory transactional store.
//!
//! Keys map to JSON values. Transactions buffer their writes and validate
//! their reads at commit time (first committer wins), so concurrent
//! read-modify-write cycles surface as retryable [`StoreError::Conflict`]s.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use crate::context::Context;
use crate::store::error::{StoreError, StoreResult};
use crate::store::{StoreTransaction, TransactionalStore};

#[derive(Debug, Clone)]
struct Entry {
    /// `None` marks a deleted key; the version survives the delete.
    value: Option<Value>,
    version: u64,
}

struct MemoryStoreInner {
    data: RwLock<BTreeMap<String, Entry>>,
    /// Global version counter, bumped once per committed transaction.
    version: AtomicU64,
    max_open: usize,
    open: Mutex<usize>,
    begins: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    conflicts: AtomicU64,
}

impl MemoryStoreInner {
    fn release_slot(&self) {
        let mut open = self.open.lock();
        *open = open.saturating_sub(1);
    }
}

/// Committed version of `key`; zero for a key never written.
fn committed_version(data: &BTreeMap<String, Entry>, key: &str) -> u64 {
    data.get(key).map(|e| e.version).unwrap_or(0)
}

/// Counters describing the store's activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub begins: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub conflicts: u64,
}

/// A thread-safe in-memory store.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryStoreInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store with no limit on open transactions.
    pub fn new() -> Self {
        Self::with_max_open(usize::MAX)
    }

    /// Create an empty store that allows at most `max_open` concurrently
    /// open transactions.
    pub fn with_max_open(max_open: usize) -> Self {
        Self {
            inner: Arc::new(MemoryStoreInner {
                data: RwLock::new(BTreeMap::new()),
                version: AtomicU64::new(0),
                max_open,
                open: Mutex::new(0),
                begins: AtomicU64::new(0),
                commits: AtomicU64::new(0),
                rollbacks: AtomicU64::new(0),
                conflicts: AtomicU64::new(0),
            }),
        }
    }

    /// Read the committed value of a key.
    pub fn read(&self, key: &str) -> Option<Value> {
        self.inner.data.read().get(key).and_then(|e| e.value.clone())
    }

    /// Snapshot of every committed key.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner
            .data
            .read()
            .iter()
            .filter_map(|(k, e)| e.value.clone().map(|v| (k.clone(), v)))
            .collect()
    }

    /// Number of transactions currently open.
    pub fn open_transactions(&self) -> usize {
        *self.inner.open.lock()
    }

    /// Current global commit version.
    pub fn current_version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Activity counters.
    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            begins: self.inner.begins.load(Ordering::Relaxed),
            commits: self.inner.commits.load(Ordering::Relaxed),
            rollbacks: self.inner.rollbacks.load(Ordering::Relaxed),
            conflicts: self.inner.conflicts.load(Ordering::Relaxed),
        }
    }
}

impl TransactionalStore for MemoryStore {
    type Tx = MemoryTransaction;

    fn begin(&self, ctx: &Context) -> StoreResult<MemoryTransaction> {
        if let Some(err) = ctx.err() {
            return Err(StoreError::Context(err));
        }

        {
            let mut open = self.inner.open.lock();
            if *open >= self.inner.max_open {
                return Err(StoreError::Exhausted {
                    open: *open,
                    max: self.inner.max_open,
                });
            }
            *open += 1;
        }
        self.inner.begins.fetch_add(1, Ordering::Relaxed);

        Ok(MemoryTransaction {
            store: Arc::clone(&self.inner),
            ctx: ctx.clone(),
            reads: HashMap::new(),
            writes: BTreeMap::new(),
            finished: false,
        })
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.inner.data.read().len())
            .field("open", &self.open_transactions())
            .finish()
    }
}

/// A unit of work against a [`MemoryStore`].
pub struct MemoryTransaction {
    store: Arc<MemoryStoreInner>,
    ctx: Context,
    /// Version of every key observed by this transaction.
    reads: HashMap<String, u64>,
    /// Buffered writes; `None` is a delete.
    writes: BTreeMap<String, Option<Value>>,
    finished: bool,
}

impl MemoryTransaction {
    fn check_context(&self) -> StoreResult<()> {
        match self.ctx.err() {
            Some(err) => Err(StoreError::Context(err)),
            None => Ok(()),
        }
    }

    /// Read a key, seeing this transaction's own writes first.
    pub fn get(&mut self, key: &str) -> StoreResult<Option<Value>> {
        self.check_context()?;
        if let Some(buffered) = self.writes.get(key) {
            return Ok(buffered.clone());
        }

        let data = self.store.data.read();
        let (value, version) = match data.get(key) {
            Some(entry) => (entry.value.clone(), entry.version),
            None => (None, 0),
        };
        self.reads.entry(key.to_string()).or_insert(version);
        Ok(value)
    }

    /// Buffer a write.
    pub fn put(&mut self, key: impl Into<String>, value: Value) -> StoreResult<()> {
        self.check_context()?;
        self.writes.insert(key.into(), Some(value));
        Ok(())
    }

    /// Buffer a delete.
    pub fn delete(&mut self, key: impl Into<String>) -> StoreResult<()> {
        self.check_context()?;
        self.writes.insert(key.into(), None);
        Ok(())
    }

    /// Number of buffered writes.
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.store.release_slot();
        }
    }
}

impl StoreTransaction for MemoryTransaction {
    fn commit(mut self) -> StoreResult<()> {
        if let Err(e) = self.check_context() {
            self.finish();
            return Err(e);
        }

        {
            let mut data = self.store.data.write();

            let stale = self
                .reads
                .iter()
                .find(|(key, seen)| committed_version(&data, key) != **seen);
            if let Some((key, _)) = stale {
                let key = key.clone();
                drop(data);
                self.store.conflicts.fetch_add(1, Ordering::Relaxed);
                self.finish();
                return Err(StoreError::Conflict { key });
            }

            if !self.writes.is_empty() {
                let version = self.store.version.fetch_add(1, Ordering::SeqCst) + 1;
                for (key, value) in std::mem::take(&mut self.writes) {
                    data.insert(key, Entry { value, version });
                }
            }
        }

        self.store.commits.fetch_add(1, Ordering::Relaxed);
        self.finish();
        Ok(())
    }

    fn rollback(mut self) -> StoreResult<()> {
        self.writes.clear();
        self.store.rollbacks.fetch_add(1, Ordering::Relaxed);
        self.finish();
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.store.rollbacks.fetch_add(1, Ordering::Relaxed);
            self.finish();
        }
    }
}

impl fmt::Debug for MemoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTransaction")
            .field("reads", &self.reads.len())
            .field("writes", &self.writes.len())
            .field("finished", &self.finished)
            .finish()
    }
}
