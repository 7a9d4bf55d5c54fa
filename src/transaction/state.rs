//! Transaction lifecycle state machine.
//!
//! Tracks the logical state of a transaction through a fixed transition
//! table:
//!
//! ```text
//! Initial ──▶ Active ──▶ Prepared ──▶ Committed | RolledBack
//!               │
//!               └──────▶ Committed | RolledBack | Aborted
//! ```
//!
//! `Committed`, `RolledBack` and `Aborted` are terminal. Rejected moves leave
//! the machine untouched.
//!
//! Callbacks registered for a state run on a dedicated dispatcher thread fed
//! by a bounded queue, in transition order. They are observational: state
//! changes never wait for them.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::GovernanceConfig;
use crate::transaction::error::{TransactionError, TransactionResult};

/// Default bound on queued, not yet executed callbacks.
pub const DEFAULT_CALLBACK_QUEUE_CAPACITY: usize = 64;

/// Logical state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    Initial,
    Active,
    Prepared,
    Committed,
    RolledBack,
    Aborted,
}

impl TransactionState {
    /// States reachable in one step.
    pub fn successors(self) -> &'static [TransactionState] {
        use TransactionState::*;
        match self {
            Initial => &[Active],
            Active => &[Prepared, Committed, RolledBack, Aborted],
            Prepared => &[Committed, RolledBack],
            Committed | RolledBack | Aborted => &[],
        }
    }

    /// Check if `self -> to` appears in the transition table.
    pub fn can_transition_to(self, to: TransactionState) -> bool {
        self.successors().contains(&to)
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Initial => "Initial",
            TransactionState::Active => "Active",
            TransactionState::Prepared => "Prepared",
            TransactionState::Committed => "Committed",
            TransactionState::RolledBack => "RolledBack",
            TransactionState::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// One accepted move, handed to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub from: TransactionState,
    pub to: TransactionState,
    pub at: DateTime<Utc>,
}

/// Callback run after the machine enters a state.
pub type StateCallback = Arc<dyn Fn(StateTransition) + Send + Sync>;

struct Job {
    callback: StateCallback,
    transition: StateTransition,
}

/// Number of enqueued but unfinished callbacks.
struct Progress {
    pending: Mutex<usize>,
    idle: Condvar,
}

impl Progress {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

struct Dispatcher {
    sender: Option<SyncSender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Dispatcher {
    fn spawn(capacity: usize, progress: Arc<Progress>) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Job>(capacity);
        let worker = thread::Builder::new()
            .name("txgov-state-callbacks".to_string())
            .spawn(move || {
                for job in receiver {
                    let Job { callback, transition } = job;
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| callback(transition)));
                    if outcome.is_err() {
                        tracing::warn!(
                            from = %transition.from,
                            to = %transition.to,
                            "state callback panicked"
                        );
                    }
                    progress.finish_one();
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain the queue and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct MachineInner {
    state: TransactionState,
    history: Vec<TransactionState>,
    callbacks: HashMap<TransactionState, StateCallback>,
}

/// Validated state tracker with per-state callbacks and an append-only
/// history of previously held states.
pub struct TransactionStateMachine {
    inner: RwLock<MachineInner>,
    dispatcher: Mutex<Option<Dispatcher>>,
    progress: Arc<Progress>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Default for TransactionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionStateMachine {
    /// Create a machine in `Initial` state.
    pub fn new() -> Self {
        Self::with_callback_capacity(DEFAULT_CALLBACK_QUEUE_CAPACITY)
    }

    /// Create a machine whose callback queue holds at most `capacity`
    /// pending callbacks.
    pub fn with_callback_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(MachineInner {
                state: TransactionState::Initial,
                history: Vec::new(),
                callbacks: HashMap::new(),
            }),
            dispatcher: Mutex::new(None),
            progress: Arc::new(Progress {
                pending: Mutex::new(0),
                idle: Condvar::new(),
            }),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Create a machine sized from configuration.
    pub fn from_config(config: &GovernanceConfig) -> Self {
        Self::with_callback_capacity(config.callback_queue_capacity)
    }

    /// Current state.
    pub fn state(&self) -> TransactionState {
        self.inner.read().state
    }

    /// Whether the current state is terminal.
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Move to `new_state` if the transition table allows it.
    pub fn set_state(&self, new_state: TransactionState) -> TransactionResult<()> {
        let mut inner = self.inner.write();
        let from = inner.state;

        if !from.can_transition_to(new_state) {
            return Err(TransactionError::InvalidStateTransition {
                from,
                to: new_state,
            });
        }

        inner.history.push(from);
        inner.state = new_state;
        tracing::debug!(%from, to = %new_state, "transaction state changed");

        if let Some(callback) = inner.callbacks.get(&new_state).cloned() {
            let transition = StateTransition {
                from,
                to: new_state,
                at: Utc::now(),
            };
            // Enqueued under the state lock so callbacks keep transition order.
            self.enqueue(Job { callback, transition });
        }
        Ok(())
    }

    /// Register the callback for `state`, replacing any earlier one.
    pub fn register_callback<F>(&self, state: TransactionState, callback: F)
    where
        F: Fn(StateTransition) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        inner.callbacks.insert(state, Arc::new(callback));
        self.ensure_dispatcher();
    }

    /// Copy of the previously held states, oldest first.
    pub fn history(&self) -> Vec<TransactionState> {
        self.inner.read().history.clone()
    }

    /// Callbacks discarded because the queue was full.
    pub fn dropped_callbacks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Block until every queued callback has run, or `timeout` elapses.
    /// Returns `true` when the queue is idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut pending = self.progress.pending.lock();
        while *pending > 0 {
            match deadline {
                Some(deadline) => {
                    if self
                        .progress
                        .idle
                        .wait_until(&mut pending, deadline)
                        .timed_out()
                    {
                        return *pending == 0;
                    }
                }
                None => self.progress.idle.wait(&mut pending),
            }
        }
        true
    }

    fn ensure_dispatcher(&self) {
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_none() {
            match Dispatcher::spawn(self.capacity, Arc::clone(&self.progress)) {
                Ok(d) => *dispatcher = Some(d),
                Err(e) => tracing::error!(error = %e, "failed to start state callback dispatcher"),
            }
        }
    }

    fn enqueue(&self, job: Job) {
        let dispatcher = self.dispatcher.lock();
        let Some(sender) = dispatcher.as_ref().and_then(|d| d.sender.as_ref()) else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        };

        *self.progress.pending.lock() += 1;
        match sender.try_send(job) {
            Ok(()) => {}
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                self.progress.finish_one();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    to = %job.transition.to,
                    "state callback queue unavailable, callback dropped"
                );
            }
        }
    }
}

impl fmt::Debug for TransactionStateMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("TransactionStateMachine")
            .field("state", &inner.state)
            .field("history", &inner.history)
            .finish()
    }
}
