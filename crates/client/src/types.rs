use ethereum_types::{Address, H256, U256};

/// One attribute record as stored by the registry, keyed externally by
/// `(account, attribute key)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeRecord {
    pub value: H256,
    /// Issuance timestamp, unix epoch seconds.
    pub issued_at: U256,
    pub issuer: Address,
}

/// Per-call parameter overrides, passed opaquely to the node.
///
/// `gas_limit` absent means "let the remote estimate the cost".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOverrides {
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u64>,
}

/// Final outcome of a submitted migration transaction.
///
/// `success == false` means the call was accepted and executed but its
/// effects were reverted by the remote environment; that is never retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    pub tx_hash: H256,
    pub success: bool,
    pub gas_used: u64,
    pub revert_reason: Option<String>,
}
