//! Before/after snapshot verification.
//!
//! The snapshot is the correctness oracle for the whole run: every
//! `(account, key)` record visible through the query surface must read the
//! same before and after the layout change, modulo the explicit issuer
//! policy.

use std::collections::BTreeMap;

use attmig_client::{AttributeRecord, ClientError, calldata::attribute_key};
use ethereum_types::{Address, H256};
use tracing::info;

use crate::error::MigrationError;
use crate::ledger::AttestationLedger;
use crate::retry::RetryExecutor;

/// Names of the attribute keys every eligible set must contain. The
/// on-chain keys are keccak hashes of these names.
pub const REQUIRED_KEY_NAMES: [&str; 5] = ["AML", "DID", "COUNTRY", "IS_BUSINESS", "SCORE"];

pub const EXPECTED_KEY_COUNT: usize = 5;

pub fn required_base_keys() -> Vec<H256> {
    REQUIRED_KEY_NAMES.iter().map(|n| attribute_key(n)).collect()
}

/// Fail-fast gate run before any chunk is submitted: the contract must
/// expose exactly the expected key set. A drifted set means the deployed
/// registry is not the one this run was planned against.
pub fn check_eligible_keys(keys: &[H256]) -> Result<(), MigrationError> {
    let required = required_base_keys();
    if keys.len() != EXPECTED_KEY_COUNT || !required.iter().all(|k| keys.contains(k)) {
        return Err(MigrationError::EligibleKeySet {
            expected: EXPECTED_KEY_COUNT,
            actual: keys.len(),
        });
    }
    Ok(())
}

/// What the migrated layout is expected to hold in the issuer field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IssuerPolicy {
    /// The issuer survives the migration unchanged.
    #[default]
    Preserve,
    /// The new layout drops issuer provenance; every migrated record must
    /// read the zero address.
    ResetToZero,
}

/// Point-in-time view of every `(account, key)` record in the working set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttributeSnapshot {
    records: BTreeMap<(Address, H256), AttributeRecord>,
}

impl AttributeSnapshot {
    /// One retried bulk read per account, all keys at once. The bulk call
    /// is length-preserving, which `read_attributes_bulk` already enforces.
    pub async fn capture<L: AttestationLedger + ?Sized>(
        ledger: &L,
        executor: &RetryExecutor,
        accounts: &[Address],
        keys: &[H256],
    ) -> Result<Self, MigrationError> {
        let mut records = BTreeMap::new();
        for account in accounts {
            let account = *account;
            let label = format!("snapshot {account:#x}");
            let row = executor
                .execute_with_retry(&label, |_| async move {
                    ledger.read_attributes_bulk(account, keys).await
                })
                .await?;
            // Guard the length invariant here too: a ledger answering
            // short must fail loudly, not zip into a partial snapshot.
            if row.len() != keys.len() {
                return Err(MigrationError::Client(ClientError::LengthMismatch {
                    expected: keys.len(),
                    actual: row.len(),
                }));
            }
            for (key, record) in keys.iter().zip(row) {
                records.insert((account, *key), record);
            }
        }
        info!(
            accounts = accounts.len(),
            records = records.len(),
            "snapshot captured"
        );
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, account: Address, key: H256) -> Option<&AttributeRecord> {
        self.records.get(&(account, key))
    }

    #[cfg(test)]
    pub(crate) fn from_records(
        records: impl IntoIterator<Item = ((Address, H256), AttributeRecord)>,
    ) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

/// One field-level divergence between the snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub account: Address,
    pub key: H256,
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:#x} / {:#x}: {} expected {}, got {}",
            self.account, self.key, self.field, self.expected, self.actual
        )
    }
}

/// Compare the snapshots record by record. Empty result means the migration
/// preserved everything the policy requires.
pub fn verify(
    before: &AttributeSnapshot,
    after: &AttributeSnapshot,
    issuer_policy: IssuerPolicy,
) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    for (&(account, key), pre) in &before.records {
        let Some(post) = after.get(account, key) else {
            mismatches.push(Mismatch {
                account,
                key,
                field: "record",
                expected: "present".to_string(),
                actual: "missing".to_string(),
            });
            continue;
        };

        if post.value != pre.value {
            mismatches.push(Mismatch {
                account,
                key,
                field: "value",
                expected: format!("{:#x}", pre.value),
                actual: format!("{:#x}", post.value),
            });
        }
        if post.issued_at != pre.issued_at {
            mismatches.push(Mismatch {
                account,
                key,
                field: "issued_at",
                expected: pre.issued_at.to_string(),
                actual: post.issued_at.to_string(),
            });
        }

        let expected_issuer = match issuer_policy {
            IssuerPolicy::Preserve => pre.issuer,
            IssuerPolicy::ResetToZero => Address::zero(),
        };
        if post.issuer != expected_issuer {
            mismatches.push(Mismatch {
                account,
                key,
                field: "issuer",
                expected: format!("{expected_issuer:#x}"),
                actual: format!("{:#x}", post.issuer),
            });
        }
    }

    mismatches
}
