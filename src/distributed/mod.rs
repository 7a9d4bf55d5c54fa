//! Distributed transactions over two-phase commit.
//!
//! A [`DistributedTransactionManager`] drives a set of
//! [`TransactionParticipant`]s and one local transactional component through
//! prepare, local commit and participant commit. An optional
//! [`DecisionLog`] records each decision so in-doubt transactions can be
//! resolved with [`DistributedTransactionManager::recover`].

mod coordinator;
mod log;
mod participant;

pub use coordinator::{
    new_transaction_id, DistributedStats, DistributedTransactionManager, RecoveryReport,
};
pub use log::{
    Decision, DecisionLog, DecisionLogError, DecisionRecord, FileDecisionLog, InDoubt,
    InMemoryDecisionLog,
};
pub use participant::{ParticipantError, ParticipantResult, TransactionParticipant};
