//! Deadline and cancellation contexts.
//!
//! A [`Context`] carries an optional deadline and a cancellation flag. Contexts
//! form a tree: cancelling a parent cancels every descendant, and a child's
//! deadline never extends past its parent's.
//!
//! ```
//! use std::time::Duration;
//! use txgov::context::{Context, ContextError};
//!
//! let (ctx, cancel) = Context::background().with_timeout(Duration::from_secs(5));
//! assert!(!ctx.is_done());
//! cancel.cancel();
//! assert_eq!(ctx.err(), Some(ContextError::Canceled));
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Why a context is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context (or one of its ancestors) was cancelled.
    #[error("context canceled")]
    Canceled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

struct ContextInner {
    deadline: Option<Instant>,
    reason: Mutex<Option<ContextError>>,
    wakeup: Condvar,
    children: Mutex<Vec<Weak<ContextInner>>>,
}

impl ContextInner {
    fn cancel(&self, reason: ContextError) {
        {
            let mut current = self.reason.lock();
            if current.is_some() {
                return;
            }
            *current = Some(reason);
        }
        self.wakeup.notify_all();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel(reason);
        }
    }
}

/// A cancellable, optionally deadline-bound context.
///
/// Cheap to clone; clones share the same cancellation state.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// A root context with no deadline that is never cancelled.
    pub fn background() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                deadline: None,
                reason: Mutex::new(None),
                wakeup: Condvar::new(),
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derive a child context that expires after `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        let requested = Instant::now().checked_add(timeout);
        let deadline = match (self.inner.deadline, requested) {
            (Some(parent), Some(child)) => Some(parent.min(child)),
            (Some(parent), None) => Some(parent),
            (None, child) => child,
        };
        self.child(deadline)
    }

    /// Derive a child context that is only done when cancelled (or when the
    /// parent is).
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        self.child(self.inner.deadline)
    }

    fn child(&self, deadline: Option<Instant>) -> (Context, CancelHandle) {
        let inner = Arc::new(ContextInner {
            deadline,
            reason: Mutex::new(None),
            wakeup: Condvar::new(),
            children: Mutex::new(Vec::new()),
        });

        let parent_reason = {
            let reason = self.inner.reason.lock();
            if reason.is_none() {
                let mut children = self.inner.children.lock();
                children.retain(|c| c.strong_count() > 0);
                children.push(Arc::downgrade(&inner));
            }
            *reason
        };
        if let Some(reason) = parent_reason {
            inner.cancel(reason);
        }

        let ctx = Context { inner };
        let handle = CancelHandle {
            inner: Arc::downgrade(&ctx.inner),
        };
        (ctx, handle)
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left before the deadline. `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Why the context is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(reason) = *self.inner.reason.lock() {
            return Some(reason);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether the context is cancelled or past its deadline.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Sleep for `duration`, returning early with the context error if the
    /// context becomes done first. A duration too large to represent as an
    /// instant sleeps until the context is done.
    pub fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        let wake_at = Instant::now().checked_add(duration);
        let until = match (wake_at, self.inner.deadline) {
            (Some(wake_at), Some(deadline)) => Some(wake_at.min(deadline)),
            (wake_at, None) => wake_at,
            (None, deadline) => deadline,
        };

        let mut reason = self.inner.reason.lock();
        loop {
            if let Some(reason) = *reason {
                return Err(reason);
            }
            match until {
                Some(until) if Instant::now() >= until => break,
                Some(until) => {
                    let _ = self.inner.wakeup.wait_until(&mut reason, until);
                }
                None => self.inner.wakeup.wait(&mut reason),
            }
        }
        drop(reason);

        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish()
    }
}

/// Cancels the context it was created with.
///
/// Holds only a weak reference, so an outstanding handle does not keep a
/// finished context alive.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Weak<ContextInner>,
}

impl CancelHandle {
    /// Cancel the context and all of its descendants. Idempotent.
    pub fn cancel(&self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.cancel(ContextError::Canceled);
        }
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}
