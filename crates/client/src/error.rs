//! Error types for the registry client, plus failure classification.
//!
//! `FailureKind` is the structured contract the migrator retries against.
//! Substring matching on node error text survives only as a compatibility
//! shim for nodes that report gas problems exclusively through
//! human-readable JSON-RPC messages.

use crate::calldata::AbiError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("ABI error: {0}")]
    Abi(#[from] AbiError),

    #[error("bulk read returned {actual} records for {expected} attribute keys")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Structured JSON-RPC transport and protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Connection to {url} failed: {cause}")]
    ConnectionFailed { url: String, cause: String },

    #[error("{method} timed out after {elapsed_ms}ms")]
    Timeout { method: String, elapsed_ms: u64 },

    #[error("{method} HTTP {status}: {body}")]
    HttpError {
        method: String,
        status: u16,
        body: String,
    },

    #[error("{method} JSON-RPC error {code}: {message}")]
    JsonRpcError {
        method: String,
        code: i64,
        message: String,
        /// Hex-encoded revert payload, when the node attaches one.
        data: Option<String>,
    },

    #[error("{method} response parse error in {field}: {cause}")]
    ParseError {
        method: String,
        field: String,
        cause: String,
    },

    /// The call was abandoned because the run's cancellation token fired.
    #[error("{method} cancelled")]
    Cancelled { method: String },
}

/// How a failed attempt should be handled by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry unchanged. Covers connectivity problems and every failure the
    /// gas shim does not recognize: a malformed call that always fails the
    /// same way also lands here and retries forever, matching the engine's
    /// liveness trade-off.
    Transient,
    /// The remote could not estimate a cost for the call.
    UnderestimatedLimit,
    /// A requested gas limit exceeds what the remote environment permits.
    ExceedsCeiling { attempted: u64, ceiling: u64 },
}

impl ClientError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ClientError::Rpc(RpcError::JsonRpcError { message, .. }) => {
                classify_node_message(message)
            }
            _ => FailureKind::Transient,
        }
    }
}

/// Compatibility shim: derive a failure kind from a node's error text.
pub fn classify_node_message(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();

    if lower.contains("cannot estimate gas")
        || lower.contains("gas required exceeds allowance")
        || lower.contains("unpredictable_gas_limit")
    {
        return FailureKind::UnderestimatedLimit;
    }

    if lower.contains("exceeds block gas limit") || lower.contains("exceeds gas ceiling") {
        // The node encodes the attempted limit and the ceiling as the first
        // two integers of the message, in that order.
        if let Some((attempted, ceiling)) = parse_gas_values(message)
            && ceiling > 0
        {
            return FailureKind::ExceedsCeiling { attempted, ceiling };
        }
    }

    FailureKind::Transient
}

/// Extract the first two unsigned integers embedded in an error message.
fn parse_gas_values(message: &str) -> Option<(u64, u64)> {
    let mut values = message
        .split(|c: char| !c.is_ascii_digit())
        .filter(|chunk| !chunk.is_empty())
        .filter_map(|chunk| chunk.parse::<u64>().ok());

    let attempted = values.next()?;
    let ceiling = values.next()?;
    Some((attempted, ceiling))
}
