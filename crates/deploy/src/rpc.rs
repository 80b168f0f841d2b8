//! Shared JSON-RPC utilities for talking to Ethereum-style endpoints.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::chain::ClientError;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|err| ClientError::new(format!("Failed to create HTTP client: {err}")))
}

/// Make a JSON-RPC call and deserialize the result.
///
/// Error messages from the node are preserved verbatim; revert data attached
/// to the error object is carried along when present.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &Url,
    method: &str,
    params: Vec<Value>,
) -> Result<T, ClientError> {
    let response = client
        .post(url.clone())
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .map_err(|err| ClientError::new(format!("Failed to send {method} request: {err}")))?;

    let result: Value = response
        .json()
        .await
        .map_err(|err| ClientError::new(format!("Failed to parse {method} response: {err}")))?;

    if let Some(error) = result.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown RPC error")
            .to_string();
        let data = error
            .get("data")
            .and_then(|d| d.as_str())
            .and_then(|d| parse_hex_bytes(d).ok());
        return Err(ClientError { message, data });
    }

    let value = result
        .get("result")
        .cloned()
        .ok_or_else(|| ClientError::new(format!("No result in {method} response")))?;

    serde_json::from_value(value)
        .map_err(|err| ClientError::new(format!("Failed to deserialize {method} result: {err}")))
}

/// Parse a 0x-prefixed hex quantity.
pub fn parse_hex_u64(value: &str) -> Result<u64, ClientError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|err| ClientError::new(format!("Invalid hex quantity '{value}': {err}")))
}

/// Parse a 0x-prefixed hex byte string.
pub fn parse_hex_bytes(value: &str) -> Result<alloy_core::primitives::Bytes, ClientError> {
    hex::decode(value.trim_start_matches("0x"))
        .map(alloy_core::primitives::Bytes::from)
        .map_err(|err| ClientError::new(format!("Invalid hex data '{value}': {err}")))
}

/// Render a quantity as 0x-prefixed hex.
pub fn to_hex_quantity(value: u128) -> String {
    format!("0x{value:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x0").unwrap(), 0);
        assert_eq!(parse_hex_u64("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_hex_quantity_round_trip() {
        assert_eq!(to_hex_quantity(0), "0x0");
        assert_eq!(parse_hex_u64(&to_hex_quantity(8_000_000)).unwrap(), 8_000_000);
    }

    #[test]
    fn test_parse_hex_bytes() {
        let bytes = parse_hex_bytes("0x08c379a0").unwrap();
        assert_eq!(bytes.as_ref(), &[0x08, 0xc3, 0x79, 0xa0]);
        assert!(parse_hex_bytes("0xnope").is_err());
    }
}
