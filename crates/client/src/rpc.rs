//! Thin async JSON-RPC HTTP client for the ledger endpoint.
//!
//! Single-attempt by design: classification and retry of failed calls is
//! the migration engine's job, so this layer only reports structured
//! errors and never sleeps.

use std::time::Duration;

use ethereum_types::{Address, H256, U256};
use serde_json::{Value, json};

use crate::error::RpcError;

/// Configuration for RPC transport behavior.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
    /// TCP connect timeout (default: 10s).
    pub connect_timeout: Duration,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    config: RpcConfig,
}

impl RpcClient {
    pub fn new(url: &str) -> Self {
        Self::with_config(url, RpcConfig::default())
    }

    pub fn with_config(url: &str, config: RpcConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            http,
            url: url.to_string(),
            config,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Execute a single JSON-RPC call.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self.http.post(&self.url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                RpcError::Timeout {
                    method: method.into(),
                    elapsed_ms: self.config.timeout.as_millis().try_into().unwrap_or(u64::MAX),
                }
            } else {
                RpcError::ConnectionFailed {
                    url: self.url.clone(),
                    cause: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RpcError::HttpError {
                method: method.into(),
                status: status.as_u16(),
                body: body_text,
            });
        }

        let json_response: Value = response.json().await.map_err(|e| RpcError::ParseError {
            method: method.into(),
            field: "response_body".into(),
            cause: e.to_string(),
        })?;

        if let Some(error) = json_response.get("error") {
            let code = error.get("code").and_then(|c| c.as_i64()).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            let data = error
                .get("data")
                .and_then(|d| d.as_str())
                .map(str::to_string);
            return Err(RpcError::JsonRpcError {
                method: method.into(),
                code,
                message,
                data,
            });
        }

        json_response
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::ParseError {
                method: method.into(),
                field: "result".into(),
                cause: "missing result field".into(),
            })
    }
}

// --- Parsing helpers ---

pub fn hex_decode(hex_str: &str) -> Result<Vec<u8>, RpcError> {
    let s = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    if s.is_empty() {
        return Ok(Vec::new());
    }
    hex::decode(s).map_err(|e| RpcError::ParseError {
        method: String::new(),
        field: "hex".into(),
        cause: e.to_string(),
    })
}

pub fn parse_u64(val: &Value) -> Result<u64, RpcError> {
    let s = val.as_str().ok_or_else(|| RpcError::ParseError {
        method: String::new(),
        field: "u64".into(),
        cause: "expected hex string".into(),
    })?;
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| RpcError::ParseError {
        method: String::new(),
        field: "u64".into(),
        cause: e.to_string(),
    })
}

pub fn parse_u256(val: &Value) -> Result<U256, RpcError> {
    let s = val.as_str().ok_or_else(|| RpcError::ParseError {
        method: String::new(),
        field: "U256".into(),
        cause: "expected hex string".into(),
    })?;
    let s = s.strip_prefix("0x").unwrap_or(s);
    U256::from_str_radix(s, 16).map_err(|e| RpcError::ParseError {
        method: String::new(),
        field: "U256".into(),
        cause: e.to_string(),
    })
}

pub fn parse_h256(val: &Value) -> Result<H256, RpcError> {
    let s = val.as_str().ok_or_else(|| RpcError::ParseError {
        method: String::new(),
        field: "H256".into(),
        cause: "expected hex string".into(),
    })?;
    let bytes = hex_decode(s)?;
    if bytes.len() != 32 {
        return Err(RpcError::ParseError {
            method: String::new(),
            field: "H256".into(),
            cause: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(H256::from_slice(&bytes))
}

pub fn parse_address(val: &Value) -> Result<Address, RpcError> {
    let s = val.as_str().ok_or_else(|| RpcError::ParseError {
        method: String::new(),
        field: "Address".into(),
        cause: "expected hex string".into(),
    })?;
    let bytes = hex_decode(s)?;
    if bytes.len() != 20 {
        return Err(RpcError::ParseError {
            method: String::new(),
            field: "Address".into(),
            cause: format!("expected 20 bytes, got {}", bytes.len()),
        });
    }
    Ok(Address::from_slice(&bytes))
}

/// Parse the result of a call returning raw bytes (`eth_call` output).
pub fn parse_bytes(val: &Value) -> Result<Vec<u8>, RpcError> {
    let s = val.as_str().ok_or_else(|| RpcError::ParseError {
        method: String::new(),
        field: "bytes".into(),
        cause: "expected hex string".into(),
    })?;
    hex_decode(s)
}
