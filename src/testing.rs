//! Scripted collaborators shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::context::Context;
use crate::distributed::{ParticipantError, ParticipantResult, TransactionParticipant};
use crate::store::{StoreError, StoreResult, StoreTransaction, TransactionalStore};

#[derive(Default)]
struct ScriptedInner {
    begins: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    begin_error: Mutex<Option<StoreError>>,
    commit_error: Mutex<Option<StoreError>>,
    rollback_error: Mutex<Option<StoreError>>,
    last_ctx: Mutex<Option<Context>>,
}

/// Store that counts calls and fails on demand.
#[derive(Clone, Default)]
pub(crate) struct ScriptedStore {
    inner: Arc<ScriptedInner>,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_begin(&self, err: StoreError) {
        *self.inner.begin_error.lock() = Some(err);
    }

    pub fn fail_commit(&self, err: StoreError) {
        *self.inner.commit_error.lock() = Some(err);
    }

    pub fn fail_rollback(&self, err: StoreError) {
        *self.inner.rollback_error.lock() = Some(err);
    }

    pub fn begins(&self) -> usize {
        self.inner.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    pub fn last_begin_context(&self) -> Option<Context> {
        self.inner.last_ctx.lock().clone()
    }
}

impl TransactionalStore for ScriptedStore {
    type Tx = ScriptedTransaction;

    fn begin(&self, ctx: &Context) -> StoreResult<ScriptedTransaction> {
        self.inner.begins.fetch_add(1, Ordering::SeqCst);
        *self.inner.last_ctx.lock() = Some(ctx.clone());
        if let Some(err) = self.inner.begin_error.lock().clone() {
            return Err(err);
        }
        Ok(ScriptedTransaction {
            inner: Arc::clone(&self.inner),
        })
    }
}

pub(crate) struct ScriptedTransaction {
    inner: Arc<ScriptedInner>,
}

impl StoreTransaction for ScriptedTransaction {
    fn commit(self) -> StoreResult<()> {
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        match self.inner.commit_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn rollback(self) -> StoreResult<()> {
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        match self.inner.rollback_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Participant that records every call and fails on demand.
#[derive(Default)]
pub(crate) struct RecordingParticipant {
    name: String,
    prepares: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_prepare: bool,
    fail_commit: bool,
    calls: Mutex<Vec<String>>,
}

impl RecordingParticipant {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn failing_prepare(name: &str) -> Self {
        Self {
            fail_prepare: true,
            ..Self::new(name)
        }
    }

    pub fn failing_commit(name: &str) -> Self {
        Self {
            fail_commit: true,
            ..Self::new(name)
        }
    }

    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// Calls received, as `"<op>:<tx_id>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl TransactionParticipant for RecordingParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn prepare(&self, _ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(format!("prepare:{}", tx_id));
        if self.fail_prepare {
            return Err(ParticipantError::Rejected(format!("{} voted no", self.name)));
        }
        Ok(())
    }

    fn commit(&self, _ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(format!("commit:{}", tx_id));
        if self.fail_commit {
            return Err(ParticipantError::Unavailable(format!("{} unreachable", self.name)));
        }
        Ok(())
    }

    fn rollback(&self, _ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(format!("rollback:{}", tx_id));
        Ok(())
    }
}
