//! JSON-RPC client for the attestation registry contract.
//!
//! This crate only knows how to talk to the remote ledger: raw JSON-RPC
//! transport, ABI calldata for the registry's functions, and settlement
//! tracking for the migration transaction. Retry and gas-limit tuning live
//! in `attmig-migrator`; every call here is a single attempt.

pub mod calldata;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod types;

pub use error::{ClientError, FailureKind, RpcError};
pub use registry::AttestationRegistry;
pub use rpc::{RpcClient, RpcConfig};
pub use types::{AttributeRecord, CallOverrides, SettlementOutcome};
