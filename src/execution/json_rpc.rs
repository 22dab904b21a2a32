use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::RpcError;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client over HTTP.
///
/// Timeouts come from the shared `reqwest::Client`.
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("rpc -> {} #{} {}", self.url, id, method);

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(RpcError::Remote {
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result)
            .map_err(|e| RpcError::Decode(format!("{} result: {}", method, e)))
    }
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_quantity(raw: &str) -> Result<u128, RpcError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("quantity without 0x prefix: {}", raw)))?;

    if digits.is_empty() {
        return Ok(0);
    }

    u128::from_str_radix(digits, 16)
        .map_err(|e| RpcError::Decode(format!("invalid quantity {}: {}", raw, e)))
}

pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Decode `0x`-prefixed hex data
pub fn parse_data(raw: &str) -> Result<Vec<u8>, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(digits).map_err(|e| RpcError::Decode(format!("invalid hex data: {}", e)))
}

pub fn to_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_roundtrip() {
        assert_eq!(parse_quantity("0x3e7").unwrap(), 999);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(to_quantity(42161), "0xa4b1");
        assert!(parse_quantity("3e7").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_data_roundtrip() {
        assert_eq!(parse_data("0x095ea7b3").unwrap(), vec![0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(to_data(&[0xde, 0xad]), "0xdead");
        assert!(parse_data("0x0").is_err());
    }
}
