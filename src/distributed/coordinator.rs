//! Two-phase commit coordinator.
//!
//! ```text
//!   snapshot participants
//!          │
//!          ▼
//!   Phase 1: prepare each ──(any fails)──▶ rollback all ──▶ PrepareFailed
//!          │
//!          ▼
//!   local with_transaction ──(fails)─────▶ rollback all ──▶ LocalFailed
//!          │
//!          ▼
//!   Phase 2: commit each ──(any fails)───▶ CommitPhaseFailed (no compensation)
//! ```
//!
//! Phases are strictly sequential. A failure in phase 2 happens after the
//! local transaction is already committed; participants may then disagree
//! until reconciled, either by an operator or by [`recover`] when a decision
//! log is attached.
//!
//! A transaction ID is claimed for the whole of `execute` and for the part
//! of `recover` that resolves it, so recovery never touches a transaction
//! this coordinator is still running.
//!
//! [`recover`]: DistributedTransactionManager::recover

use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use crate::context::Context;
use crate::distributed::log::{Decision, DecisionLog, DecisionRecord};
use crate::distributed::participant::TransactionParticipant;
use crate::transaction::{TransactionError, TransactionResult, Transactional};

type SharedParticipant = Arc<dyn TransactionParticipant>;

/// Generate a fresh distributed transaction ID.
pub fn new_transaction_id() -> String {
    Ulid::new().to_string().to_lowercase()
}

/// Outcome counters for a coordinator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributedStats {
    pub committed: u64,
    pub aborted: u64,
    /// Transactions left inconsistent by a phase-2 failure.
    pub commit_failures: u64,
}

/// What a recovery pass resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// In-doubt transactions whose commit was re-driven to completion.
    pub committed: usize,
    /// In-doubt transactions rolled back everywhere.
    pub rolled_back: usize,
    /// In-doubt transactions still unresolved.
    pub unresolved: usize,
    /// In-doubt entries skipped because the transaction is still running.
    pub in_flight: usize,
}

#[derive(Default)]
struct StatsCounters {
    committed: AtomicU64,
    aborted: AtomicU64,
    commit_failures: AtomicU64,
}

/// Releases a claimed transaction ID when dropped.
struct Claim<'a> {
    claimed: &'a Mutex<HashSet<String>>,
    tx_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claimed.lock().remove(&self.tx_id);
    }
}

fn names_of(participants: &[SharedParticipant]) -> Vec<String> {
    participants.iter().map(|p| p.name().to_string()).collect()
}

/// Coordinates participants and one local transactional component through
/// two-phase commit.
pub struct DistributedTransactionManager<M: Transactional> {
    local: M,
    participants: RwLock<Vec<SharedParticipant>>,
    log: Option<Arc<dyn DecisionLog>>,
    /// Transaction IDs owned by a running `execute` or `recover`.
    claimed: Mutex<HashSet<String>>,
    stats: StatsCounters,
}

impl<M: Transactional> DistributedTransactionManager<M> {
    /// Create a coordinator around the local component.
    pub fn new(local: M) -> Self {
        Self {
            local,
            participants: RwLock::new(Vec::new()),
            log: None,
            claimed: Mutex::new(HashSet::new()),
            stats: StatsCounters::default(),
        }
    }

    /// Record decisions in `log` before acting on them.
    pub fn with_decision_log(mut self, log: Arc<dyn DecisionLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// The local transactional component.
    pub fn local(&self) -> &M {
        &self.local
    }

    /// Join a participant to every subsequent distributed transaction.
    pub fn add_participant<P>(&self, participant: Arc<P>)
    where
        P: TransactionParticipant + 'static,
    {
        self.participants.write().push(participant);
    }

    pub fn participant_count(&self) -> usize {
        self.participants.read().len()
    }

    pub fn stats(&self) -> DistributedStats {
        DistributedStats {
            committed: self.stats.committed.load(Ordering::Relaxed),
            aborted: self.stats.aborted.load(Ordering::Relaxed),
            commit_failures: self.stats.commit_failures.load(Ordering::Relaxed),
        }
    }

    /// Run `local_fn` as the local branch of distributed transaction `tx_id`.
    ///
    /// Participants registered concurrently with this call are not part of
    /// it. A panic in `local_fn` aborts all participants and then resumes.
    /// Fails with [`TransactionError::InProgress`] if `tx_id` is already
    /// being executed or recovered.
    pub fn execute<F, T>(&self, ctx: &Context, tx_id: &str, local_fn: F) -> TransactionResult<T>
    where
        F: FnOnce(&mut M::Tx) -> TransactionResult<T>,
    {
        let _claim = self.claim(tx_id).ok_or_else(|| TransactionError::InProgress {
            tx_id: tx_id.to_string(),
        })?;

        let participants: Vec<SharedParticipant> = self.participants.read().clone();
        let names = names_of(&participants);
        self.record(tx_id, Decision::Started, &names)?;

        // Phase 1
        for participant in &participants {
            if let Err(e) = participant.prepare(ctx, tx_id) {
                tracing::warn!(
                    tx_id,
                    participant = participant.name(),
                    error = %e,
                    "prepare failed, aborting distributed transaction"
                );
                self.abort(ctx, tx_id, &participants, &names);
                return Err(TransactionError::PrepareFailed {
                    tx_id: tx_id.to_string(),
                    source: e,
                });
            }
        }

        let local = panic::catch_unwind(AssertUnwindSafe(|| {
            self.local.with_transaction(ctx, local_fn)
        }));
        let value = match local {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                tracing::warn!(tx_id, error = %e, "local transaction failed, aborting");
                self.abort(ctx, tx_id, &participants, &names);
                return Err(TransactionError::LocalFailed {
                    tx_id: tx_id.to_string(),
                    source: Box::new(e),
                });
            }
            Err(payload) => {
                self.abort(ctx, tx_id, &participants, &names);
                panic::resume_unwind(payload)
            }
        };

        // The local commit is the point of no return.
        if let Err(e) = self.record(tx_id, Decision::Commit, &names) {
            tracing::error!(tx_id, error = %e, "failed to log commit decision");
        }

        // Phase 2
        let mut failed = 0;
        let mut first_error = None;
        for participant in &participants {
            if let Err(e) = participant.commit(ctx, tx_id) {
                tracing::error!(
                    tx_id,
                    participant = participant.name(),
                    error = %e,
                    "commit failed after local commit, participants need reconciliation"
                );
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        if let Some(source) = first_error {
            self.stats.commit_failures.fetch_add(1, Ordering::Relaxed);
            return Err(TransactionError::CommitPhaseFailed {
                tx_id: tx_id.to_string(),
                failed,
                source,
            });
        }

        self.complete(tx_id, &names);
        self.stats.committed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(tx_id, participants = participants.len(), "distributed transaction committed");
        Ok(value)
    }

    /// Resolve transactions left in doubt by a crash or a phase-2 failure.
    ///
    /// Transactions with a logged commit decision are committed on the
    /// participants recorded for them; all others are rolled back there
    /// (presumed abort). Participants are matched by name. A recorded
    /// participant that is no longer registered leaves its transaction
    /// unresolved. Transactions still running on this coordinator are
    /// skipped. Without a decision log this is a no-op.
    pub fn recover(&self, ctx: &Context) -> TransactionResult<RecoveryReport> {
        let Some(log) = &self.log else {
            return Ok(RecoveryReport::default());
        };

        let mut report = RecoveryReport::default();

        // Read the log under the claim lock: an unclaimed entry then belongs
        // to no running `execute`, and claiming it keeps new ones out.
        let work = {
            let mut claimed = self.claimed.lock();
            let mut work = Vec::new();
            for entry in log.in_doubt()? {
                if claimed.insert(entry.tx_id.clone()) {
                    work.push(entry);
                } else {
                    report.in_flight += 1;
                }
            }
            work
        };
        let claims: Vec<Claim<'_>> = work
            .iter()
            .map(|entry| Claim {
                claimed: &self.claimed,
                tx_id: entry.tx_id.clone(),
            })
            .collect();

        let registered: Vec<SharedParticipant> = self.participants.read().clone();

        for entry in &work {
            let commit = entry.last == Decision::Commit;
            let mut resolved = true;

            for name in &entry.participants {
                if !registered.iter().any(|p| p.name() == name.as_str()) {
                    tracing::warn!(
                        tx_id = %entry.tx_id,
                        participant = %name,
                        "recorded participant is not registered, cannot recover"
                    );
                    resolved = false;
                }
            }

            let targets = registered
                .iter()
                .filter(|p| entry.participants.iter().any(|n| n == p.name()));
            for participant in targets {
                let outcome = if commit {
                    participant.commit(ctx, &entry.tx_id)
                } else {
                    participant.rollback(ctx, &entry.tx_id)
                };
                if let Err(e) = outcome {
                    tracing::warn!(
                        tx_id = %entry.tx_id,
                        participant = participant.name(),
                        error = %e,
                        "recovery step failed"
                    );
                    resolved = false;
                }
            }

            if !resolved {
                report.unresolved += 1;
                continue;
            }
            log.append(&DecisionRecord::new(
                entry.tx_id.as_str(),
                Decision::Completed,
                entry.participants.clone(),
            ))?;
            if commit {
                report.committed += 1;
            } else {
                report.rolled_back += 1;
            }
        }
        drop(claims);

        tracing::debug!(?report, "recovery finished");
        Ok(report)
    }

    fn claim(&self, tx_id: &str) -> Option<Claim<'_>> {
        if !self.claimed.lock().insert(tx_id.to_string()) {
            return None;
        }
        Some(Claim {
            claimed: &self.claimed,
            tx_id: tx_id.to_string(),
        })
    }

    fn abort(
        &self,
        ctx: &Context,
        tx_id: &str,
        participants: &[SharedParticipant],
        names: &[String],
    ) {
        if let Err(e) = self.record(tx_id, Decision::Abort, names) {
            tracing::warn!(tx_id, error = %e, "failed to log abort decision");
        }

        let mut clean = true;
        for participant in participants {
            if let Err(e) = participant.rollback(ctx, tx_id) {
                tracing::warn!(
                    tx_id,
                    participant = participant.name(),
                    error = %e,
                    "participant rollback failed"
                );
                clean = false;
            }
        }

        if clean {
            self.complete(tx_id, names);
        }
        self.stats.aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn complete(&self, tx_id: &str, names: &[String]) {
        if let Err(e) = self.record(tx_id, Decision::Completed, names) {
            tracing::warn!(tx_id, error = %e, "failed to log completion");
        }
    }

    fn record(&self, tx_id: &str, decision: Decision, names: &[String]) -> TransactionResult<()> {
        if let Some(log) = &self.log {
            log.append(&DecisionRecord::new(tx_id, decision, names.to_vec()))?;
        }
        Ok(())
    }
}

impl<M: Transactional> fmt::Debug for DistributedTransactionManager<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedTransactionManager")
            .field("participants", &self.participant_count())
            .field("decision_log", &self.log.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::log::InMemoryDecisionLog;
    use crate::distributed::{ParticipantError, ParticipantResult};
    use crate::store::{MemoryStore, StoreError};
    use crate::testing::{RecordingParticipant, ScriptedStore};
    use crate::transaction::{TransactionHandle, TransactionManager};
    use serde_json::json;
    use std::time::Duration;

    fn coordinator() -> (ScriptedStore, DistributedTransactionManager<TransactionManager<ScriptedStore>>) {
        let store = ScriptedStore::new();
        let local = TransactionManager::new(store.clone(), Duration::from_secs(5));
        (store, DistributedTransactionManager::new(local))
    }

    #[test]
    fn test_all_phases_succeed() {
        let (store, dtm) = coordinator();
        let a = Arc::new(RecordingParticipant::new("a"));
        let b = Arc::new(RecordingParticipant::new("b"));
        dtm.add_participant(Arc::clone(&a));
        dtm.add_participant(Arc::clone(&b));

        let value = dtm.execute(&Context::background(), "tx-1", |_tx| Ok("done")).unwrap();

        assert_eq!(value, "done");
        assert_eq!(a.calls(), vec!["prepare:tx-1", "commit:tx-1"]);
        assert_eq!(b.calls(), vec!["prepare:tx-1", "commit:tx-1"]);
        assert_eq!(store.commits(), 1);
        assert_eq!(dtm.stats().committed, 1);
    }

    #[test]
    fn test_prepare_failure_rolls_back_everyone() {
        let (store, dtm) = coordinator();
        let p1 = Arc::new(RecordingParticipant::new("p1"));
        let p2 = Arc::new(RecordingParticipant::failing_prepare("p2"));
        let p3 = Arc::new(RecordingParticipant::new("p3"));
        dtm.add_participant(Arc::clone(&p1));
        dtm.add_participant(Arc::clone(&p2));
        dtm.add_participant(Arc::clone(&p3));

        let err = dtm
            .execute(&Context::background(), "tx-2", |_tx| Ok(()))
            .unwrap_err();

        assert!(matches!(err, TransactionError::PrepareFailed { .. }));
        assert!(err.to_string().contains("prepare phase failed"));
        assert_eq!(p1.rollbacks(), 1);
        assert_eq!(p3.rollbacks(), 1);
        assert_eq!(p3.prepares(), 0);
        assert_eq!(p1.commits() + p2.commits() + p3.commits(), 0);
        assert_eq!(store.begins(), 0);
        assert_eq!(dtm.stats().aborted, 1);
    }

    #[test]
    fn test_local_failure_rolls_back_participants() {
        let (store, dtm) = coordinator();
        let p = Arc::new(RecordingParticipant::new("p"));
        dtm.add_participant(Arc::clone(&p));

        let err = dtm
            .execute(&Context::background(), "tx-3", |_tx| -> TransactionResult<()> {
                Err(TransactionError::execution("constraint violated"))
            })
            .unwrap_err();

        assert!(err.to_string().contains("local transaction failed"));
        assert!(matches!(err, TransactionError::LocalFailed { .. }));
        assert_eq!(p.calls(), vec!["prepare:tx-3", "rollback:tx-3"]);
        assert_eq!(store.rollbacks(), 1);
    }

    #[test]
    fn test_local_commit_failure_rolls_back_participants() {
        let (store, dtm) = coordinator();
        store.fail_commit(StoreError::Deadlock);
        let p = Arc::new(RecordingParticipant::new("p"));
        dtm.add_participant(Arc::clone(&p));

        let err = dtm.execute(&Context::background(), "tx-4", |_tx| Ok(())).unwrap_err();
        match err {
            TransactionError::LocalFailed { source, .. } => {
                assert!(matches!(*source, TransactionError::Store(StoreError::Deadlock)));
            }
            other => panic!("expected LocalFailed, got {:?}", other),
        }
        assert_eq!(p.commits(), 0);
        assert_eq!(p.rollbacks(), 1);
    }

    #[test]
    fn test_commit_phase_failure_is_surfaced_not_compensated() {
        let (store, dtm) = coordinator();
        let p1 = Arc::new(RecordingParticipant::new("p1"));
        let p2 = Arc::new(RecordingParticipant::failing_commit("p2"));
        let p3 = Arc::new(RecordingParticipant::new("p3"));
        dtm.add_participant(Arc::clone(&p1));
        dtm.add_participant(Arc::clone(&p2));
        dtm.add_participant(Arc::clone(&p3));

        let err = dtm
            .execute(&Context::background(), "tx-5", |_tx| Ok(()))
            .unwrap_err();

        assert!(err.to_string().contains("commit phase failed"));
        match &err {
            TransactionError::CommitPhaseFailed { failed, source, .. } => {
                assert_eq!(*failed, 1);
                assert!(matches!(source, ParticipantError::Unavailable(_)));
            }
            other => panic!("expected CommitPhaseFailed, got {:?}", other),
        }
        assert_eq!(p1.commits(), 1);
        assert_eq!(p1.rollbacks(), 0);
        assert_eq!(p3.commits(), 1);
        assert_eq!(store.commits(), 1);
        assert_eq!(dtm.stats().commit_failures, 1);
    }

    #[test]
    fn test_local_panic_aborts_participants() {
        let (store, dtm) = coordinator();
        let p = Arc::new(RecordingParticipant::new("p"));
        dtm.add_participant(Arc::clone(&p));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let _: TransactionResult<()> =
                dtm.execute(&Context::background(), "tx-6", |_tx| panic!("local blew up"));
        }));

        assert!(outcome.is_err());
        assert_eq!(p.rollbacks(), 1);
        assert_eq!(store.rollbacks(), 1);
    }

    #[test]
    fn test_no_participants_runs_local_only() {
        let store = MemoryStore::new();
        let dtm = DistributedTransactionManager::new(TransactionManager::new(
            store.clone(),
            Duration::from_secs(5),
        ));

        dtm.execute(&Context::background(), &new_transaction_id(), |tx| {
            tx.underlying_mut().expect("open").put("orders/1", json!({"total": 10}))?;
            Ok(())
        })
        .unwrap();
        assert!(store.read("orders/1").is_some());
    }

    #[test]
    fn test_decision_log_records_lifecycle() {
        let (_store, dtm) = coordinator();
        let log = Arc::new(InMemoryDecisionLog::new());
        let dtm = dtm.with_decision_log(log.clone());
        dtm.add_participant(Arc::new(RecordingParticipant::new("p")));

        dtm.execute(&Context::background(), "tx-7", |_tx| Ok(())).unwrap();

        let records = log.records().unwrap();
        let decisions: Vec<Decision> = records.iter().map(|r| r.decision).collect();
        assert_eq!(decisions, vec![Decision::Started, Decision::Commit, Decision::Completed]);
        assert!(records.iter().all(|r| r.participants == vec!["p".to_string()]));
        assert!(log.in_doubt().unwrap().is_empty());
    }

    #[test]
    fn test_recover_redrives_commit_and_presumes_abort() {
        let (_store, dtm) = coordinator();
        let log = Arc::new(InMemoryDecisionLog::new());
        let enlisted = vec!["p".to_string()];
        log.append(&DecisionRecord::new("decided", Decision::Started, enlisted.clone())).unwrap();
        log.append(&DecisionRecord::new("decided", Decision::Commit, enlisted.clone())).unwrap();
        log.append(&DecisionRecord::new("undecided", Decision::Started, enlisted)).unwrap();

        let dtm = dtm.with_decision_log(log.clone());
        let p = Arc::new(RecordingParticipant::new("p"));
        let bystander = Arc::new(RecordingParticipant::new("bystander"));
        dtm.add_participant(Arc::clone(&p));
        dtm.add_participant(Arc::clone(&bystander));

        let report = dtm.recover(&Context::background()).unwrap();
        assert_eq!(
            report,
            RecoveryReport { committed: 1, rolled_back: 1, unresolved: 0, in_flight: 0 }
        );
        assert_eq!(p.calls(), vec!["commit:decided", "rollback:undecided"]);
        assert!(bystander.calls().is_empty());
        assert!(log.in_doubt().unwrap().is_empty());
    }

    #[test]
    fn test_commit_phase_failure_stays_in_doubt() {
        let (_store, dtm) = coordinator();
        let log = Arc::new(InMemoryDecisionLog::new());
        let dtm = dtm.with_decision_log(log.clone());
        dtm.add_participant(Arc::new(RecordingParticipant::failing_commit("flaky")));

        assert!(dtm.execute(&Context::background(), "tx-8", |_tx| Ok(())).is_err());

        let in_doubt = log.in_doubt().unwrap();
        assert_eq!(in_doubt.len(), 1);
        assert_eq!(in_doubt[0].last, Decision::Commit);

        let report = dtm.recover(&Context::background()).unwrap();
        assert_eq!(report.unresolved, 1);
    }

    #[test]
    fn test_recover_ignores_participants_added_later() {
        let (_store, dtm) = coordinator();
        let log = Arc::new(InMemoryDecisionLog::new());
        let dtm = dtm.with_decision_log(log.clone());
        let a = Arc::new(RecordingParticipant::failing_commit("a"));
        dtm.add_participant(Arc::clone(&a));

        assert!(dtm.execute(&Context::background(), "t1", |_tx| Ok(())).is_err());

        let late = Arc::new(RecordingParticipant::new("late"));
        dtm.add_participant(Arc::clone(&late));

        let report = dtm.recover(&Context::background()).unwrap();
        assert_eq!(report.unresolved, 1);
        assert_eq!(a.calls(), vec!["prepare:t1", "commit:t1", "commit:t1"]);
        assert!(late.calls().is_empty());
    }

    #[test]
    fn test_recover_leaves_unregistered_participant_unresolved() {
        let (_store, dtm) = coordinator();
        let log = Arc::new(InMemoryDecisionLog::new());
        let enlisted = vec!["kept".to_string(), "gone".to_string()];
        log.append(&DecisionRecord::new("t2", Decision::Started, enlisted.clone())).unwrap();
        log.append(&DecisionRecord::new("t2", Decision::Commit, enlisted)).unwrap();

        let dtm = dtm.with_decision_log(log.clone());
        let kept = Arc::new(RecordingParticipant::new("kept"));
        dtm.add_participant(Arc::clone(&kept));

        let report = dtm.recover(&Context::background()).unwrap();
        assert_eq!(report.unresolved, 1);
        assert_eq!(kept.calls(), vec!["commit:t2"]);
        assert_eq!(log.in_doubt().unwrap().len(), 1);
    }

    type RecoverHook = Box<dyn Fn() -> TransactionResult<RecoveryReport> + Send + Sync>;

    /// Runs a recovery pass from inside its own prepare.
    struct RecoveringParticipant {
        calls: RecordingParticipant,
        hook: Mutex<Option<RecoverHook>>,
        report: Mutex<Option<RecoveryReport>>,
    }

    impl TransactionParticipant for RecoveringParticipant {
        fn name(&self) -> &str {
            self.calls.name()
        }

        fn prepare(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
            self.calls.prepare(ctx, tx_id)?;
            if let Some(hook) = self.hook.lock().as_ref() {
                *self.report.lock() = hook().ok();
            }
            Ok(())
        }

        fn commit(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
            self.calls.commit(ctx, tx_id)
        }

        fn rollback(&self, ctx: &Context, tx_id: &str) -> ParticipantResult<()> {
            self.calls.rollback(ctx, tx_id)
        }
    }

    #[test]
    fn test_recover_skips_running_transaction() {
        let (_store, dtm) = coordinator();
        let log = Arc::new(InMemoryDecisionLog::new());
        let dtm = Arc::new(dtm.with_decision_log(log.clone()));

        let p = Arc::new(RecoveringParticipant {
            calls: RecordingParticipant::new("p"),
            hook: Mutex::new(None),
            report: Mutex::new(None),
        });
        let weak = Arc::downgrade(&dtm);
        *p.hook.lock() = Some(Box::new(move || {
            weak.upgrade()
                .expect("coordinator alive")
                .recover(&Context::background())
        }));
        dtm.add_participant(Arc::clone(&p));

        dtm.execute(&Context::background(), "live", |_tx| Ok(())).unwrap();

        assert_eq!(
            *p.report.lock(),
            Some(RecoveryReport { in_flight: 1, ..RecoveryReport::default() })
        );
        assert_eq!(p.calls.calls(), vec!["prepare:live", "commit:live"]);
        assert!(log.in_doubt().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_transaction_id_is_rejected_while_running() {
        let (store, dtm) = coordinator();
        let ctx = Context::background();

        dtm.execute(&ctx, "dup", |_tx| {
            let nested = dtm.execute(&ctx, "dup", |_tx| Ok(()));
            assert!(matches!(nested, Err(TransactionError::InProgress { .. })));
            Ok(())
        })
        .unwrap();

        assert_eq!(store.commits(), 1);
        dtm.execute(&ctx, "dup", |_tx| Ok(())).unwrap();
    }

    #[test]
    fn test_recover_without_log_is_noop() {
        let (_store, dtm) = coordinator();
        assert_eq!(dtm.recover(&Context::background()).unwrap(), RecoveryReport::default());
    }

    #[test]
    fn test_concurrent_add_participant_does_not_affect_snapshot() {
        let (_store, dtm) = coordinator();
        let dtm = Arc::new(dtm);
        let late = Arc::new(RecordingParticipant::new("late"));

        let adder = {
            let dtm = Arc::clone(&dtm);
            let late = Arc::clone(&late);
            move || dtm.add_participant(late)
        };

        dtm.execute(&Context::background(), "tx-9", |_tx| {
            adder();
            Ok(())
        })
        .unwrap();

        assert_eq!(dtm.participant_count(), 1);
        assert_eq!(late.prepares(), 0);
        assert_eq!(late.commits(), 0);
    }

    #[test]
    fn test_transaction_ids_are_unique() {
        assert_ne!(new_transaction_id(), new_transaction_id());
    }
}
