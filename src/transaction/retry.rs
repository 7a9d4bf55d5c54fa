//! Retry with exponential backoff.
//!
//! [`RetryManager::execute_with_retry`] re-runs a transactional closure while
//! it fails with a retryable error, sleeping between attempts. The sleep
//! honours the caller's context.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::context::Context;
use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::manager::Transactional;

/// Decides whether a failed attempt may be retried.
pub type RetryClassifier = Arc<dyn Fn(&TransactionError) -> bool + Send + Sync>;

/// Re-executes transactional work on retryable failure.
#[derive(Clone)]
pub struct RetryManager {
    max_retries: u32,
    interval: Duration,
    backoff_factor: f64,
    classifier: RetryClassifier,
}

impl RetryManager {
    /// `max_retries` extra attempts after the first, starting `interval`
    /// apart and growing by `backoff_factor` each round.
    pub fn new(max_retries: u32, interval: Duration, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            interval,
            backoff_factor,
            classifier: Arc::new(TransactionError::is_retryable),
        }
    }

    /// Create a retry manager from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.interval(), config.backoff_factor)
    }

    /// Replace the retryability predicate.
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&TransactionError) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run `f` inside `manager.with_transaction`, retrying on retryable
    /// failure.
    ///
    /// Returns the first success. When attempts run out, or a failure is not
    /// retryable, returns [`TransactionError::RetryExhausted`] wrapping the
    /// last failure. If `ctx` is done during a backoff sleep the context
    /// error is returned immediately.
    pub fn execute_with_retry<M, F, T>(
        &self,
        ctx: &Context,
        manager: &M,
        mut f: F,
    ) -> TransactionResult<T>
    where
        M: Transactional,
        F: FnMut(&mut M::Tx) -> TransactionResult<T>,
    {
        let mut interval = self.interval;
        let mut attempts: u32 = 0;

        let last_error = loop {
            attempts += 1;
            let err = match manager.with_transaction(ctx, |tx| f(tx)) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if attempts > self.max_retries {
                break err;
            }
            if !(self.classifier)(&err) {
                tracing::debug!(attempts, error = %err, "error is not retryable");
                break err;
            }

            tracing::debug!(attempts, ?interval, error = %err, "transaction failed, retrying");
            ctx.sleep(interval)?;
            interval = next_interval(interval, self.backoff_factor);
        };

        Err(TransactionError::RetryExhausted {
            attempts,
            source: Box::new(last_error),
        })
    }
}

fn next_interval(interval: Duration, factor: f64) -> Duration {
    let secs = interval.as_secs_f64() * factor;
    if secs.is_finite() && secs >= 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        interval
    }
}

impl fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryManager")
            .field("max_retries", &self.max_retries)
            .field("interval", &self.interval)
            .field("backoff_factor", &self.backoff_factor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextError;
    use crate::store::{MemoryStore, StoreError};
    use crate::testing::ScriptedStore;
    use crate::transaction::{TransactionHandle, TransactionManager};
    use serde_json::json;
    use std::thread;
    use std::time::Instant;

    fn manager() -> (ScriptedStore, TransactionManager<ScriptedStore>) {
        let store = ScriptedStore::new();
        (store.clone(), TransactionManager::new(store, Duration::from_secs(5)))
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let (store, manager) = manager();
        let retry = RetryManager::new(2, Duration::from_millis(10), 2.0);

        let mut calls = 0;
        let start = Instant::now();
        let result = retry.execute_with_retry(&Context::background(), &manager, |_tx| {
            calls += 1;
            if calls <= 2 {
                Err(TransactionError::Store(StoreError::Deadlock))
            } else {
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(calls, 3);
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(store.rollbacks(), 2);
        assert_eq!(store.commits(), 1);
    }

    #[test]
    fn test_exhausted_wraps_last_error() {
        let (_store, manager) = manager();
        let retry = RetryManager::new(2, Duration::from_millis(1), 1.0);

        let mut calls = 0;
        let err = retry
            .execute_with_retry(&Context::background(), &manager, |_tx| -> TransactionResult<()> {
                calls += 1;
                Err(TransactionError::Store(StoreError::Timeout))
            })
            .unwrap_err();

        assert_eq!(calls, 3);
        match err {
            TransactionError::RetryExhausted { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, TransactionError::Store(StoreError::Timeout)));
            }
            other => panic!("expected RetryExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_non_retryable_stops_immediately() {
        let (_store, manager) = manager();
        let retry = RetryManager::new(5, Duration::from_millis(1), 2.0);

        let mut calls = 0;
        let err = retry
            .execute_with_retry(&Context::background(), &manager, |_tx| -> TransactionResult<()> {
                calls += 1;
                Err(TransactionError::execution("email already taken"))
            })
            .unwrap_err();

        assert_eq!(calls, 1);
        assert!(matches!(err, TransactionError::RetryExhausted { attempts: 1, .. }));
    }

    #[test]
    fn test_custom_classifier() {
        let (_store, manager) = manager();
        let retry = RetryManager::new(3, Duration::from_millis(1), 1.0)
            .with_classifier(|e| matches!(e, TransactionError::Execution(_)));

        let mut calls = 0;
        let result = retry.execute_with_retry(&Context::background(), &manager, |_tx| {
            calls += 1;
            if calls < 3 {
                Err(TransactionError::execution("flaky"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_cancel_during_backoff_returns_context_error() {
        let (_store, manager) = manager();
        let retry = RetryManager::new(3, Duration::from_secs(30), 2.0);
        let (ctx, cancel) = Context::background().with_cancel();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            cancel.cancel();
        });

        let start = Instant::now();
        let err = retry
            .execute_with_retry(&ctx, &manager, |_tx| -> TransactionResult<()> {
                Err(TransactionError::Store(StoreError::Deadlock))
            })
            .unwrap_err();

        assert!(matches!(err, TransactionError::Context(ContextError::Canceled)));
        assert!(start.elapsed() < Duration::from_secs(10));
        canceller.join().unwrap();
    }

    #[test]
    fn test_huge_interval_waits_for_deadline() {
        let (_store, manager) = manager();
        let retry = RetryManager::new(2, Duration::MAX, 2.0);
        let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(50));

        let err = retry
            .execute_with_retry(&ctx, &manager, |_tx| -> TransactionResult<()> {
                Err(TransactionError::Store(StoreError::Deadlock))
            })
            .unwrap_err();

        assert!(matches!(err, TransactionError::Context(ContextError::DeadlineExceeded)));
    }

    #[test]
    fn test_resolves_write_conflicts() {
        let store = MemoryStore::new();
        let manager = TransactionManager::new(store.clone(), Duration::from_secs(5));
        let retry = RetryManager::new(3, Duration::from_millis(1), 2.0);
        let ctx = Context::background();

        manager
            .with_transaction(&ctx, |tx| {
                tx.underlying_mut().expect("open").put("counter", json!(0))?;
                Ok(())
            })
            .unwrap();

        let mut interfered = false;
        retry
            .execute_with_retry(&ctx, &manager, |tx| {
                let current = tx
                    .underlying_mut()
                    .expect("open")
                    .get("counter")?
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);

                // A concurrent writer sneaks in during the first attempt.
                if !interfered {
                    interfered = true;
                    manager.with_transaction(&ctx, |other| {
                        other.underlying_mut().expect("open").put("counter", json!(100))?;
                        Ok(())
                    })?;
                }

                tx.underlying_mut().expect("open").put("counter", json!(current + 1))?;
                Ok(())
            })
            .unwrap();

        assert_eq!(store.read("counter"), Some(json!(101)));
        assert_eq!(store.stats().conflicts, 1);
    }

    #[test]
    fn test_next_interval() {
        assert_eq!(next_interval(Duration::from_millis(10), 2.0), Duration::from_millis(20));
        assert_eq!(next_interval(Duration::from_millis(10), -1.0), Duration::from_millis(10));
        assert_eq!(next_interval(Duration::from_secs(1), f64::INFINITY), Duration::from_secs(1));
    }
}
