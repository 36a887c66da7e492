//! Seam between the migration engine and the remote registry.
//!
//! The engine only ever talks to this trait, which keeps the scheduler and
//! verifier testable against an in-memory ledger.

use async_trait::async_trait;
use attmig_client::{
    AttestationRegistry, AttributeRecord, CallOverrides, ClientError, SettlementOutcome,
};
use ethereum_types::{Address, H256};

#[async_trait]
pub trait AttestationLedger: Send + Sync {
    /// Attribute keys included in the migration, in contract-defined order.
    async fn eligible_attribute_keys(&self) -> Result<Vec<H256>, ClientError>;

    async fn eligible_attribute_count(&self) -> Result<u64, ClientError>;

    /// One record per key, in request order.
    async fn read_attributes_bulk(
        &self,
        account: Address,
        keys: &[H256],
    ) -> Result<Vec<AttributeRecord>, ClientError>;

    /// Submit one migration chunk and block until it settles.
    async fn migrate_attributes(
        &self,
        accounts: &[Address],
        keys: &[H256],
        overrides: CallOverrides,
    ) -> Result<SettlementOutcome, ClientError>;

    /// Accounts with issuance activity in a block range.
    async fn collect_accounts(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Address>, ClientError>;
}

#[async_trait]
impl AttestationLedger for AttestationRegistry {
    async fn eligible_attribute_keys(&self) -> Result<Vec<H256>, ClientError> {
        AttestationRegistry::eligible_attribute_keys(self).await
    }

    async fn eligible_attribute_count(&self) -> Result<u64, ClientError> {
        AttestationRegistry::eligible_attribute_count(self).await
    }

    async fn read_attributes_bulk(
        &self,
        account: Address,
        keys: &[H256],
    ) -> Result<Vec<AttributeRecord>, ClientError> {
        AttestationRegistry::read_attributes_bulk(self, account, keys).await
    }

    async fn migrate_attributes(
        &self,
        accounts: &[Address],
        keys: &[H256],
        overrides: CallOverrides,
    ) -> Result<SettlementOutcome, ClientError> {
        AttestationRegistry::migrate_attributes(self, accounts, keys, overrides).await
    }

    async fn collect_accounts(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Address>, ClientError> {
        AttestationRegistry::collect_accounts(self, from_block, to_block).await
    }
}
