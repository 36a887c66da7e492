//! End-to-end orchestration of one migration run.
//!
//! Order of operations: eligible-key gate, pre-run snapshot, chunked
//! submission, post-run snapshot, verification. Only a run that clears
//! every stage counts as migrated; the checkpoint file is removed at the
//! very end so a failure anywhere keeps the resume point.

use std::time::{Duration, Instant};

use tracing::info;

use crate::checkpoint::CheckpointStore;
use crate::chunks::{ChunkScheduler, MigrationPlan};
use crate::error::MigrationError;
use crate::ledger::AttestationLedger;
use crate::retry::RetryExecutor;
use crate::verify::{self, AttributeSnapshot, IssuerPolicy};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationSummary {
    pub num_chunks: usize,
    pub chunks_submitted: usize,
    pub accounts_migrated: usize,
    pub total_gas_used: u64,
    pub records_verified: usize,
    pub elapsed: Duration,
}

pub struct MigrationRunner<'a, L: AttestationLedger + ?Sized> {
    ledger: &'a L,
    executor: RetryExecutor,
    checkpoint: Option<CheckpointStore>,
    issuer_policy: IssuerPolicy,
}

impl<'a, L: AttestationLedger + ?Sized> MigrationRunner<'a, L> {
    pub fn new(
        ledger: &'a L,
        executor: RetryExecutor,
        checkpoint: Option<CheckpointStore>,
        issuer_policy: IssuerPolicy,
    ) -> Self {
        Self {
            ledger,
            executor,
            checkpoint,
            issuer_policy,
        }
    }

    pub async fn run(&self, mut plan: MigrationPlan) -> Result<MigrationSummary, MigrationError> {
        let started = Instant::now();
        plan.validate()?;

        // The key set gates the whole run: a drifted contract fails here,
        // before anything is submitted.
        let ledger = self.ledger;
        let keys = self
            .executor
            .execute_with_retry("eligible key listing", |_| async move {
                ledger.eligible_attribute_keys().await
            })
            .await?;
        let advertised = self
            .executor
            .execute_with_retry("eligible key count", |_| async move {
                ledger.eligible_attribute_count().await
            })
            .await?;
        // The count the contract advertises must agree with the listing it
        // returned; a disagreement means the two reads straddled an
        // eligibility change.
        if advertised != keys.len() as u64 {
            return Err(MigrationError::EligibleKeySet {
                expected: advertised as usize,
                actual: keys.len(),
            });
        }
        verify::check_eligible_keys(&keys)?;
        plan.eligible_keys = keys;

        let pending = plan.pending_accounts().to_vec();
        info!(
            accounts = plan.working_set.len(),
            pending = pending.len(),
            chunk_size = plan.chunk_size,
            resume_index = plan.resume_index,
            num_chunks = plan.num_chunks(),
            "starting migration run"
        );

        let before =
            AttributeSnapshot::capture(self.ledger, &self.executor, &pending, &plan.eligible_keys)
                .await?;

        let scheduler = ChunkScheduler::new(self.ledger, &self.executor, self.checkpoint.as_ref());
        let report = scheduler.run(&plan).await?;

        let after =
            AttributeSnapshot::capture(self.ledger, &self.executor, &pending, &plan.eligible_keys)
                .await?;

        let mismatches = verify::verify(&before, &after, self.issuer_policy);
        if !mismatches.is_empty() {
            return Err(MigrationError::VerificationMismatch(mismatches));
        }

        if let Some(store) = &self.checkpoint {
            store.clear()?;
        }

        let summary = MigrationSummary {
            num_chunks: report.num_chunks,
            chunks_submitted: report.chunks_submitted,
            accounts_migrated: report.accounts_migrated,
            total_gas_used: report.total_gas_used,
            records_verified: before.len(),
            elapsed: started.elapsed(),
        };
        info!(
            chunks = summary.chunks_submitted,
            accounts = summary.accounts_migrated,
            gas_used = summary.total_gas_used,
            records_verified = summary.records_verified,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "migration run verified"
        );
        Ok(summary)
    }
}
