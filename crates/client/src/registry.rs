//! Typed surface over the attestation registry contract.
//!
//! Reads go through `eth_call`; the migration itself is an
//! `eth_sendTransaction` from a node-managed signer followed by receipt
//! polling. A reverted settlement is replayed with `eth_call` at the
//! failing block to recover the `Error(string)` reason.

use std::time::Duration;

use ethereum_types::{Address, H256};
use serde_json::{Value as Json, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    calldata::{
        Value, decode_bytes32_array, decode_record_array, decode_revert_reason, decode_u64,
        encode_calldata, keccak256,
    },
    error::{ClientError, RpcError},
    rpc::{RpcClient, hex_decode, parse_bytes, parse_h256, parse_u64},
    types::{AttributeRecord, CallOverrides, SettlementOutcome},
};

const ELIGIBLE_KEYS_SIGNATURE: &str = "eligibleAttributeKeys()";
const ELIGIBLE_COUNT_SIGNATURE: &str = "eligibleAttributeCount()";
const READ_BULK_SIGNATURE: &str = "attributesBulk(address,bytes32[])";
const MIGRATE_SIGNATURE: &str = "migrateAttributes(address[],bytes32[])";

/// Event emitted by the registry when an attribute is issued; its first
/// indexed topic is the account, which is how block-range working sets are
/// collected.
const ATTRIBUTE_ISSUED_EVENT: &str = "AttributeIssued(address,bytes32,uint256)";

/// How often a pending transaction's receipt is polled.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct AttestationRegistry {
    rpc: RpcClient,
    address: Address,
    signer: Address,
    cancel: CancellationToken,
}

impl AttestationRegistry {
    pub fn new(rpc: RpcClient, address: Address, signer: Address) -> Self {
        Self {
            rpc,
            address,
            signer,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the run's cancellation token so receipt polling can be
    /// interrupted; without it a never-mined transaction blocks forever.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> Address {
        self.signer
    }

    pub async fn eligible_attribute_keys(&self) -> Result<Vec<H256>, ClientError> {
        let output = self.eth_call(ELIGIBLE_KEYS_SIGNATURE, &[]).await?;
        Ok(decode_bytes32_array(&output)?)
    }

    pub async fn eligible_attribute_count(&self) -> Result<u64, ClientError> {
        let output = self.eth_call(ELIGIBLE_COUNT_SIGNATURE, &[]).await?;
        Ok(decode_u64(&output)?)
    }

    /// Bulk read of one account's records across `keys`. The contract
    /// returns one record per requested key, in request order; a shorter or
    /// longer answer is a client error.
    pub async fn read_attributes_bulk(
        &self,
        account: Address,
        keys: &[H256],
    ) -> Result<Vec<AttributeRecord>, ClientError> {
        let args = [
            Value::Address(account),
            Value::Array(keys.iter().copied().map(Value::FixedBytes).collect()),
        ];
        let output = self.eth_call(READ_BULK_SIGNATURE, &args).await?;
        decode_bulk_output(&output, keys.len())
    }

    /// Submit the batched migration call and block until it settles.
    pub async fn migrate_attributes(
        &self,
        accounts: &[Address],
        keys: &[H256],
        overrides: CallOverrides,
    ) -> Result<SettlementOutcome, ClientError> {
        let calldata = encode_calldata(
            MIGRATE_SIGNATURE,
            &[
                Value::Array(accounts.iter().copied().map(Value::Address).collect()),
                Value::Array(keys.iter().copied().map(Value::FixedBytes).collect()),
            ],
        )?;

        let mut tx = json!({
            "from": format!("0x{:x}", self.signer),
            "to": format!("0x{:x}", self.address),
            "data": format!("0x{}", hex::encode(&calldata)),
        });
        if let Some(gas_limit) = overrides.gas_limit {
            tx["gas"] = json!(format!("0x{gas_limit:x}"));
        }
        if let Some(max_fee) = overrides.max_fee_per_gas {
            tx["maxFeePerGas"] = json!(format!("0x{max_fee:x}"));
        }

        trace!(
            accounts = accounts.len(),
            gas_limit = ?overrides.gas_limit,
            "submitting migrateAttributes"
        );
        let result = self.rpc.call("eth_sendTransaction", json!([tx])).await?;
        let tx_hash = parse_h256(&result)?;
        debug!(tx_hash = %format!("{tx_hash:#x}"), "migration transaction accepted by node");

        let receipt = self.wait_for_receipt(tx_hash).await?;

        let revert_reason = if receipt.success {
            None
        } else {
            Some(self.fetch_revert_reason(&tx, receipt.block_number).await)
        };

        Ok(SettlementOutcome {
            tx_hash,
            success: receipt.success,
            gas_used: receipt.gas_used,
            revert_reason,
        })
    }

    /// Collect accounts that received attestations within a block range, by
    /// scanning the registry's issuance logs.
    pub async fn collect_accounts(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Address>, ClientError> {
        let topic0 = H256(keccak256(ATTRIBUTE_ISSUED_EVENT.as_bytes()));
        let filter = json!({
            "fromBlock": format!("0x{from_block:x}"),
            "toBlock": format!("0x{to_block:x}"),
            "address": format!("0x{:x}", self.address),
            "topics": [format!("{topic0:#x}")],
        });

        let result = self.rpc.call("eth_getLogs", json!([filter])).await?;
        let logs = result.as_array().ok_or_else(|| RpcError::ParseError {
            method: "eth_getLogs".into(),
            field: "result".into(),
            cause: "expected array".into(),
        })?;

        let mut accounts = Vec::with_capacity(logs.len());
        for log in logs {
            let topics = log
                .get("topics")
                .and_then(|t| t.as_array())
                .ok_or_else(|| RpcError::ParseError {
                    method: "eth_getLogs".into(),
                    field: "topics".into(),
                    cause: "missing".into(),
                })?;
            let account_topic = topics.get(1).ok_or_else(|| RpcError::ParseError {
                method: "eth_getLogs".into(),
                field: "topics[1]".into(),
                cause: "missing indexed account".into(),
            })?;
            let word = parse_h256(account_topic)?;
            accounts.push(Address::from_slice(&word.0[12..]));
        }
        Ok(accounts)
    }

    async fn eth_call(&self, signature: &str, args: &[Value]) -> Result<Vec<u8>, ClientError> {
        let calldata = encode_calldata(signature, args)?;
        let call = json!({
            "to": format!("0x{:x}", self.address),
            "data": format!("0x{}", hex::encode(&calldata)),
        });
        let result = self.rpc.call("eth_call", json!([call, "latest"])).await?;
        Ok(parse_bytes(&result)?)
    }

    async fn wait_for_receipt(&self, tx_hash: H256) -> Result<Receipt, ClientError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(RpcError::Cancelled {
                    method: "eth_getTransactionReceipt".into(),
                }
                .into());
            }

            let result = self
                .rpc
                .call(
                    "eth_getTransactionReceipt",
                    json!([format!("{tx_hash:#x}")]),
                )
                .await?;

            if result.is_null() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        return Err(RpcError::Cancelled {
                            method: "eth_getTransactionReceipt".into(),
                        }
                        .into());
                    }
                    _ = tokio::time::sleep(RECEIPT_POLL_INTERVAL) => {}
                }
                continue;
            }

            let success = result
                .get("status")
                .map(parse_u64)
                .transpose()?
                .unwrap_or(0)
                == 1;
            let gas_used = result.get("gasUsed").map(parse_u64).transpose()?.unwrap_or(0);
            let block_number = result
                .get("blockNumber")
                .map(parse_u64)
                .transpose()?
                .unwrap_or(0);

            return Ok(Receipt {
                success,
                gas_used,
                block_number,
            });
        }
    }

    /// Replay a reverted transaction with `eth_call` at the block it
    /// settled in and decode the revert payload. Reasons are best-effort:
    /// any failure to recover one is reported inline rather than surfaced
    /// as its own error.
    async fn fetch_revert_reason(&self, tx: &Json, block_number: u64) -> String {
        let result = self
            .rpc
            .call(
                "eth_call",
                json!([tx, format!("0x{block_number:x}")]),
            )
            .await;

        match result {
            Err(RpcError::JsonRpcError { message, data, .. }) => data
                .as_deref()
                .and_then(|payload| hex_decode(payload).ok())
                .and_then(|bytes| decode_revert_reason(&bytes))
                .unwrap_or(message),
            Err(other) => format!("revert reason unavailable: {other}"),
            Ok(_) => "revert reason unavailable: replay succeeded".to_string(),
        }
    }
}

struct Receipt {
    success: bool,
    gas_used: u64,
    block_number: u64,
}

/// Decode the bulk-read output and enforce that the contract answered one
/// record per requested key.
fn decode_bulk_output(output: &[u8], expected: usize) -> Result<Vec<AttributeRecord>, ClientError> {
    let records = decode_record_array(output)?;

    if records.len() != expected {
        return Err(ClientError::LengthMismatch {
            expected,
            actual: records.len(),
        });
    }

    Ok(records
        .into_iter()
        .map(|(value, issued_at, issuer)| AttributeRecord {
            value,
            issued_at,
            issuer,
        })
        .collect())
}
