//! Fixed-size, resumable chunking of the migration working set.

use attmig_client::CallOverrides;
use ethereum_types::{Address, H256};
use tracing::{error, info};

use crate::checkpoint::CheckpointStore;
use crate::error::MigrationError;
use crate::ledger::AttestationLedger;
use crate::retry::RetryExecutor;

/// Inputs of one migration run. `resume_index` is an input and is never
/// mutated: a failed run reports the index to resume from, it does not
/// rewrite its own plan.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    /// Ordered, deduplicated accounts to migrate.
    pub working_set: Vec<Address>,
    pub chunk_size: usize,
    /// First chunk index to submit; everything before it is assumed done.
    pub resume_index: usize,
    /// Attribute keys included in every chunk's call, contract order.
    pub eligible_keys: Vec<H256>,
    /// Operator-supplied starting gas limit; adaptive overrides replace it
    /// once a gas failure is observed.
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u64>,
}

impl MigrationPlan {
    pub fn new(working_set: Vec<Address>, chunk_size: usize) -> Self {
        Self {
            working_set: dedup_preserving_order(working_set),
            chunk_size,
            resume_index: 0,
            eligible_keys: Vec::new(),
            gas_limit: None,
            max_fee_per_gas: None,
        }
    }

    pub fn num_chunks(&self) -> usize {
        self.working_set.len().div_ceil(self.chunk_size.max(1))
    }

    /// Ordered partitioning of the working set. A pure function of
    /// `(working_set, chunk_size)`: the same inputs always yield the same
    /// chunks, which is what makes resuming by index sound.
    pub fn chunks(&self) -> impl Iterator<Item = &[Address]> {
        self.working_set.chunks(self.chunk_size.max(1))
    }

    /// Accounts belonging to chunks at or past the resume index.
    pub fn pending_accounts(&self) -> &[Address] {
        let start = self
            .resume_index
            .saturating_mul(self.chunk_size.max(1))
            .min(self.working_set.len());
        &self.working_set[start..]
    }

    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.chunk_size == 0 {
            return Err(MigrationError::InvalidPlan(
                "chunk size must be at least 1".to_string(),
            ));
        }
        if self.working_set.is_empty() {
            return Err(MigrationError::InvalidPlan(
                "working set is empty".to_string(),
            ));
        }
        let num_chunks = self.num_chunks();
        if self.resume_index > num_chunks {
            return Err(MigrationError::InvalidPlan(format!(
                "resume index {} exceeds chunk count {num_chunks}",
                self.resume_index
            )));
        }
        Ok(())
    }
}

fn dedup_preserving_order(accounts: Vec<Address>) -> Vec<Address> {
    let mut seen = std::collections::HashSet::with_capacity(accounts.len());
    accounts
        .into_iter()
        .filter(|account| seen.insert(*account))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRunReport {
    pub num_chunks: usize,
    pub chunks_submitted: usize,
    pub accounts_migrated: usize,
    pub total_gas_used: u64,
}

/// Submits chunks strictly in order, one settled call at a time.
pub struct ChunkScheduler<'a, L: AttestationLedger + ?Sized> {
    ledger: &'a L,
    executor: &'a RetryExecutor,
    checkpoint: Option<&'a CheckpointStore>,
}

impl<'a, L: AttestationLedger + ?Sized> ChunkScheduler<'a, L> {
    pub fn new(
        ledger: &'a L,
        executor: &'a RetryExecutor,
        checkpoint: Option<&'a CheckpointStore>,
    ) -> Self {
        Self {
            ledger,
            executor,
            checkpoint,
        }
    }

    /// Drive the run from `plan.resume_index` to the last chunk. A reverted
    /// settlement is fatal: the chunk's effects did not apply, and blindly
    /// continuing would leave a hole in the middle of the migrated range.
    pub async fn run(&self, plan: &MigrationPlan) -> Result<ChunkRunReport, MigrationError> {
        plan.validate()?;

        let num_chunks = plan.num_chunks();
        let ledger = self.ledger;
        let keys: &[H256] = &plan.eligible_keys;
        let starting_gas_limit = plan.gas_limit;
        let max_fee_per_gas = plan.max_fee_per_gas;

        let mut report = ChunkRunReport {
            num_chunks,
            chunks_submitted: 0,
            accounts_migrated: 0,
            total_gas_used: 0,
        };

        for (index, chunk) in plan.chunks().enumerate() {
            if index < plan.resume_index {
                continue;
            }

            let label = format!("chunk {}/{num_chunks}", index + 1);
            let outcome = self
                .executor
                .execute_with_retry(&label, |state| async move {
                    let overrides = CallOverrides {
                        gas_limit: state.limit().or(starting_gas_limit),
                        max_fee_per_gas,
                    };
                    ledger.migrate_attributes(chunk, keys, overrides).await
                })
                .await?;

            if !outcome.success {
                let reason = outcome
                    .revert_reason
                    .unwrap_or_else(|| "revert reason unavailable".to_string());
                error!(chunk = index + 1, num_chunks, %reason, "settlement reverted");
                return Err(MigrationError::FatalSettlement {
                    chunk_index: index,
                    resume_from: index,
                    reason,
                });
            }

            info!(
                chunk = index + 1,
                num_chunks,
                accounts = chunk.len(),
                gas_used = outcome.gas_used,
                tx_hash = %format!("{:#x}", outcome.tx_hash),
                "chunk settled"
            );

            report.chunks_submitted += 1;
            report.accounts_migrated += chunk.len();
            report.total_gas_used = report.total_gas_used.saturating_add(outcome.gas_used);

            if let Some(store) = self.checkpoint {
                store.record(index)?;
            }
        }

        Ok(report)
    }
}
