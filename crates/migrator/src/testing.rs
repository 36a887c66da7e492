//! Scripted in-memory ledger for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use attmig_client::{
    AttributeRecord, CallOverrides, ClientError, RpcError, SettlementOutcome,
};
use ethereum_types::{Address, H256, U256};

use crate::ledger::AttestationLedger;
use crate::verify::required_base_keys;

pub(crate) fn account(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

pub(crate) fn eligible_base_keys() -> Vec<H256> {
    required_base_keys()
}

/// What the next `migrate_attributes` call should do. An empty script
/// settles every call.
#[derive(Debug, Clone)]
pub(crate) enum MigrateScript {
    Settle,
    /// Accepted by the node, then reverted with this reason.
    Revert(String),
    /// Transport-level failure before any outcome exists.
    Fail(String),
    /// JSON-RPC rejection with this node error message; exercises the gas
    /// classification shim.
    Reject(String),
}

pub(crate) struct MockLedger {
    keys: Vec<H256>,
    records: Mutex<HashMap<(Address, H256), AttributeRecord>>,
    script: Mutex<VecDeque<MigrateScript>>,
    migrate_calls: Mutex<Vec<Vec<Address>>>,
    overrides_seen: Mutex<Vec<CallOverrides>>,
    advertised_count: Mutex<Option<u64>>,
    bulk_read_limit: Mutex<Option<usize>>,
}

impl MockLedger {
    pub(crate) fn new(keys: Vec<H256>) -> Self {
        Self {
            keys,
            records: Mutex::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            migrate_calls: Mutex::new(Vec::new()),
            overrides_seen: Mutex::new(Vec::new()),
            advertised_count: Mutex::new(None),
            bulk_read_limit: Mutex::new(None),
        }
    }

    pub(crate) fn with_base_keys() -> Self {
        Self::new(eligible_base_keys())
    }

    pub(crate) fn script(&self, steps: Vec<MigrateScript>) {
        self.script.lock().unwrap().extend(steps);
    }

    /// Make `eligible_attribute_count` disagree with the listed keys.
    pub(crate) fn set_advertised_count(&self, count: u64) {
        *self.advertised_count.lock().unwrap() = Some(count);
    }

    /// Truncate every bulk read to at most `limit` records, simulating a
    /// contract that answers short.
    pub(crate) fn truncate_bulk_reads(&self, limit: usize) {
        *self.bulk_read_limit.lock().unwrap() = Some(limit);
    }

    pub(crate) fn insert_record(&self, acct: Address, key: H256, record: AttributeRecord) {
        self.records.lock().unwrap().insert((acct, key), record);
    }

    pub(crate) fn set_record_issuer(&self, acct: Address, key: H256, issuer: Address) {
        if let Some(record) = self.records.lock().unwrap().get_mut(&(acct, key)) {
            record.issuer = issuer;
        }
    }

    /// Account lists of every call that produced a settlement outcome,
    /// submission order.
    pub(crate) fn migrate_calls(&self) -> Vec<Vec<Address>> {
        self.migrate_calls.lock().unwrap().clone()
    }

    pub(crate) fn overrides_seen(&self) -> Vec<CallOverrides> {
        self.overrides_seen.lock().unwrap().clone()
    }

    fn next_script(&self) -> MigrateScript {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MigrateScript::Settle)
    }
}

#[async_trait]
impl AttestationLedger for MockLedger {
    async fn eligible_attribute_keys(&self) -> Result<Vec<H256>, ClientError> {
        Ok(self.keys.clone())
    }

    async fn eligible_attribute_count(&self) -> Result<u64, ClientError> {
        Ok(self
            .advertised_count
            .lock()
            .unwrap()
            .unwrap_or(self.keys.len() as u64))
    }

    async fn read_attributes_bulk(
        &self,
        acct: Address,
        keys: &[H256],
    ) -> Result<Vec<AttributeRecord>, ClientError> {
        let limit = self.bulk_read_limit.lock().unwrap().unwrap_or(keys.len());
        let records = self.records.lock().unwrap();
        Ok(keys
            .iter()
            .take(limit)
            .map(|key| {
                records
                    .get(&(acct, *key))
                    .copied()
                    .unwrap_or(AttributeRecord {
                        value: H256::zero(),
                        issued_at: U256::zero(),
                        issuer: Address::zero(),
                    })
            })
            .collect())
    }

    async fn migrate_attributes(
        &self,
        accounts: &[Address],
        _keys: &[H256],
        overrides: CallOverrides,
    ) -> Result<SettlementOutcome, ClientError> {
        self.overrides_seen.lock().unwrap().push(overrides);

        match self.next_script() {
            MigrateScript::Fail(cause) => Err(ClientError::Rpc(RpcError::ConnectionFailed {
                url: "http://mock".into(),
                cause,
            })),
            MigrateScript::Reject(message) => Err(ClientError::Rpc(RpcError::JsonRpcError {
                method: "eth_sendTransaction".into(),
                code: -32000,
                message,
                data: None,
            })),
            MigrateScript::Revert(reason) => {
                self.migrate_calls.lock().unwrap().push(accounts.to_vec());
                Ok(SettlementOutcome {
                    tx_hash: H256::from_low_u64_be(0xdead),
                    success: false,
                    gas_used: 21_000,
                    revert_reason: Some(reason),
                })
            }
            MigrateScript::Settle => {
                self.migrate_calls.lock().unwrap().push(accounts.to_vec());
                Ok(SettlementOutcome {
                    tx_hash: H256::from_low_u64_be(
                        0x1000 + self.migrate_calls.lock().unwrap().len() as u64,
                    ),
                    success: true,
                    gas_used: 60_000 * accounts.len() as u64,
                    revert_reason: None,
                })
            }
        }
    }

    async fn collect_accounts(
        &self,
        _from_block: u64,
        _to_block: u64,
    ) -> Result<Vec<Address>, ClientError> {
        let records = self.records.lock().unwrap();
        let mut accounts: Vec<Address> = records.keys().map(|(acct, _)| *acct).collect();
        accounts.sort();
        accounts.dedup();
        Ok(accounts)
    }
}
