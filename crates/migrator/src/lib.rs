//! Resilient execution and chunked-migration engine for attestation
//! records.
//!
//! The engine drives a batched storage-layout migration on a remote
//! registry contract through fixed-size, resumable chunks. Remote calls
//! are retried with jittered backoff; gas-limit failures feed an adaptive
//! per-call override; a before/after snapshot of every migrated record is
//! the correctness oracle for the whole run.

pub mod checkpoint;
pub mod chunks;
pub mod error;
pub mod gas;
pub mod ledger;
pub mod retry;
pub mod runner;
pub mod verify;

pub use checkpoint::CheckpointStore;
pub use chunks::{ChunkRunReport, ChunkScheduler, MigrationPlan};
pub use error::MigrationError;
pub use gas::GasLimitState;
pub use ledger::AttestationLedger;
pub use retry::{RetryExecutor, RetryPolicy};
pub use runner::{MigrationRunner, MigrationSummary};
pub use verify::{AttributeSnapshot, IssuerPolicy, Mismatch};

#[cfg(test)]
pub(crate) mod testing;
