//! JSON-RPC backed implementation of the chain-client seam.

use std::sync::Arc;
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use crate::artifact::{ContractArtifact, ContractInstance};
use crate::chain::{
    BlockHeader, ChainClient, ClientError, DecodedLog, LogEntry, TxHandle, TxHandleSender,
    TxNotification, TxParams, TxReceipt,
};
use crate::error::decode_revert_reason;
use crate::router::DEFAULT_TIMEOUT_BLOCKS;
use crate::rpc;

/// Interval between receipt polls for a submitted transaction.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A [`ChainClient`] speaking plain JSON-RPC over HTTP.
///
/// Constructor arguments are expected ABI-encoded (0x-prefixed hex words)
/// and are appended to the deployment bytecode verbatim; encoding against
/// the ABI is the artifact tooling's job. Native confirmations are not
/// delivered over HTTP transports; the orchestrator synthesizes its own by
/// counting blocks.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    http: reqwest::Client,
    url: Url,
    fork_url: Option<Url>,
}

/// Block header fields from an RPC response.
#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    #[serde(rename = "gasLimit")]
    gas_limit: String,
}

/// Receipt fields from an RPC response, hex quantities still encoded.
#[derive(Debug, Deserialize)]
struct RawReceipt {
    #[serde(rename = "transactionHash")]
    transaction_hash: B256,
    #[serde(rename = "blockNumber")]
    block_number: String,
    #[serde(rename = "contractAddress")]
    contract_address: Option<Address>,
    #[serde(rename = "gasUsed")]
    gas_used: String,
    status: String,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
}

impl RawReceipt {
    fn into_receipt(self) -> Result<TxReceipt, ClientError> {
        Ok(TxReceipt {
            transaction_hash: self.transaction_hash,
            block_number: rpc::parse_hex_u64(&self.block_number)?,
            contract_address: self.contract_address,
            gas_used: rpc::parse_hex_u64(&self.gas_used)?,
            status: rpc::parse_hex_u64(&self.status)? != 0,
            logs: self
                .logs
                .into_iter()
                .map(|log| LogEntry {
                    address: log.address,
                    topics: log.topics,
                    data: log.data,
                })
                .collect(),
        })
    }
}

impl HttpChainClient {
    /// Connect to a JSON-RPC endpoint. `fork_url`, when set, points at a
    /// forked copy of the same network and enables rehearsals.
    pub fn connect(url: Url, fork_url: Option<Url>) -> Result<Self, ClientError> {
        Ok(Self {
            http: rpc::create_client()?,
            url,
            fork_url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Assemble the JSON transaction object for a deployment.
    fn tx_object(params: &TxParams) -> Result<Value, ClientError> {
        let mut data = format!("0x{}", hex::encode(&params.data));
        for arg in &params.args {
            let Some(word) = arg.as_str() else {
                return Err(ClientError::new(
                    "Invalid number of parameters: constructor arguments must be ABI-encoded hex strings",
                ));
            };
            data.push_str(word.trim_start_matches("0x"));
        }

        let mut tx = serde_json::Map::new();
        tx.insert("data".to_string(), json!(data));
        if let Some(from) = params.from {
            tx.insert("from".to_string(), json!(from.to_string()));
        }
        if let Some(gas) = params.gas {
            tx.insert("gas".to_string(), json!(rpc::to_hex_quantity(gas as u128)));
        }
        if let Some(gas_price) = params.gas_price {
            tx.insert(
                "gasPrice".to_string(),
                json!(rpc::to_hex_quantity(gas_price)),
            );
        }
        Ok(Value::Object(tx))
    }

    async fn fetch_block_number(&self) -> Result<u64, ClientError> {
        let number: String =
            rpc::json_rpc_call(&self.http, &self.url, "eth_blockNumber", Vec::new()).await?;
        rpc::parse_hex_u64(&number)
    }

    async fn fetch_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, ClientError> {
        let raw: Option<RawReceipt> = rpc::json_rpc_call(
            &self.http,
            &self.url,
            "eth_getTransactionReceipt",
            vec![json!(hash.to_string())],
        )
        .await?;
        raw.map(RawReceipt::into_receipt).transpose()
    }

    /// Send the deployment and feed the handle until it settles. The
    /// client's own abandonment error fires after [`DEFAULT_TIMEOUT_BLOCKS`];
    /// polling continues up to the caller's `timeout_blocks` when that is
    /// larger.
    async fn drive_submission(&self, params: TxParams, sender: TxHandleSender) {
        let tx = match Self::tx_object(&params) {
            Ok(tx) => tx,
            Err(err) => {
                sender.notify(TxNotification::Error(err.clone()));
                sender.complete(Err(err));
                return;
            }
        };

        let hash: B256 = match rpc::json_rpc_call(
            &self.http,
            &self.url,
            "eth_sendTransaction",
            vec![tx],
        )
        .await
        {
            Ok(hash) => hash,
            Err(err) => {
                sender.notify(TxNotification::Error(err.clone()));
                sender.complete(Err(err));
                return;
            }
        };
        sender.notify(TxNotification::Hash(hash));

        let give_up_after = params.timeout_blocks.max(DEFAULT_TIMEOUT_BLOCKS);
        let mut start_block: Option<u64> = None;
        let mut abandonment_sent = false;

        let receipt = loop {
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;

            match self.fetch_receipt(hash).await {
                Ok(Some(receipt)) => break receipt,
                Ok(None) => {}
                Err(err) => {
                    tracing::trace!(error = %err, "Receipt poll failed, retrying");
                    continue;
                }
            }

            let Ok(current) = self.fetch_block_number().await else {
                continue;
            };
            let start = *start_block.get_or_insert(current);
            let waited = current.saturating_sub(start);

            if waited >= DEFAULT_TIMEOUT_BLOCKS && !abandonment_sent {
                sender.notify(TxNotification::Error(ClientError::new(format!(
                    "Transaction {hash} was not mined within {DEFAULT_TIMEOUT_BLOCKS} blocks, \
                     please make sure your transaction was properly sent. \
                     Be aware that it might still be mined!"
                ))));
                abandonment_sent = true;
            }
            if waited >= give_up_after {
                sender.complete(Err(ClientError::new(format!(
                    "Transaction {hash} was not mined within {give_up_after} blocks"
                ))));
                return;
            }
        };

        let status = receipt.status;
        let contract_address = receipt.contract_address;
        sender.notify(TxNotification::Receipt(receipt));

        if !status {
            // A failure status settles through the router's receipt check.
            return;
        }

        match contract_address {
            Some(address) => sender.complete(Ok(ContractInstance {
                contract_name: params.contract_name.clone(),
                address,
                transaction_hash: Some(hash),
            })),
            None => sender.complete(Err(ClientError::new(format!(
                "Receipt for {hash} carries no contract address"
            )))),
        }
    }
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn network_id(&self) -> Result<u64, ClientError> {
        let version: String =
            rpc::json_rpc_call(&self.http, &self.url, "net_version", Vec::new()).await?;
        version
            .parse()
            .map_err(|err| ClientError::new(format!("Invalid network id '{version}': {err}")))
    }

    async fn block_number(&self) -> Result<u64, ClientError> {
        self.fetch_block_number().await
    }

    async fn latest_block(&self) -> Result<BlockHeader, ClientError> {
        let block: RawBlock = rpc::json_rpc_call(
            &self.http,
            &self.url,
            "eth_getBlockByNumber",
            vec![json!("latest"), json!(false)],
        )
        .await?;
        Ok(BlockHeader {
            number: rpc::parse_hex_u64(&block.number)?,
            gas_limit: rpc::parse_hex_u64(&block.gas_limit)?,
        })
    }

    async fn estimate_gas(&self, params: &TxParams) -> Result<u64, ClientError> {
        let tx = Self::tx_object(params)?;
        let estimate: String =
            rpc::json_rpc_call(&self.http, &self.url, "eth_estimateGas", vec![tx]).await?;
        rpc::parse_hex_u64(&estimate)
    }

    fn submit(&self, params: TxParams) -> TxHandle {
        let (sender, handle) = TxHandle::channel();
        let client = self.clone();
        tokio::spawn(async move { client.drive_submission(params, sender).await });
        handle
    }

    async fn instance_at(
        &self,
        artifact: &ContractArtifact,
        address: Address,
    ) -> Result<ContractInstance, ClientError> {
        let code: String = rpc::json_rpc_call(
            &self.http,
            &self.url,
            "eth_getCode",
            vec![json!(address.to_string()), json!("latest")],
        )
        .await?;
        if code == "0x" {
            return Err(ClientError::new(format!(
                "Contract {} has no deployed code at {address}",
                artifact.contract_name
            )));
        }

        let transaction_hash = artifact
            .networks
            .values()
            .find(|record| record.address == Some(address))
            .and_then(|record| record.transaction_hash);

        Ok(ContractInstance {
            contract_name: artifact.contract_name.clone(),
            address,
            transaction_hash,
        })
    }

    fn decode_logs(&self, _contract_name: &str, logs: &[LogEntry]) -> Vec<DecodedLog> {
        // Full ABI decoding lives with the artifact tooling; over the wire an
        // event is identified by its signature topic.
        logs.iter()
            .map(|log| DecodedLog {
                event: log
                    .topics
                    .first()
                    .map(|topic| topic.to_string())
                    .unwrap_or_else(|| "anonymous".to_string()),
                args: json!({
                    "address": log.address.to_string(),
                    "topics": log.topics.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                    "data": format!("0x{}", hex::encode(&log.data)),
                }),
            })
            .collect()
    }

    async fn revert_reason(&self, params: &TxParams, receipt: &TxReceipt) -> Option<String> {
        // Replay the call at the block it mined in; the node rejects it with
        // the revert data attached.
        let tx = Self::tx_object(params).ok()?;
        let block = json!(rpc::to_hex_quantity(receipt.block_number as u128));
        match rpc::json_rpc_call::<Value>(&self.http, &self.url, "eth_call", vec![tx, block]).await
        {
            Ok(_) => None,
            Err(err) => err.data.as_deref().and_then(|data| decode_revert_reason(data)),
        }
    }

    async fn fork(&self) -> Result<Arc<dyn ChainClient>, ClientError> {
        let fork_url = self.fork_url.clone().ok_or_else(|| {
            ClientError::new("No fork endpoint configured; set fork_rpc_url to enable rehearsals")
        })?;
        Ok(Arc::new(Self::connect(fork_url, None)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_object_appends_encoded_args() {
        let params = TxParams {
            contract_name: "Example".to_string(),
            data: Bytes::from(vec![0x60, 0x80]),
            args: vec![json!(
                "0x000000000000000000000000000000000000000000000000000000000000002a"
            )],
            gas: Some(100_000),
            gas_price: Some(1_000_000_000),
            from: None,
            timeout_blocks: 0,
        };

        let tx = HttpChainClient::tx_object(&params).unwrap();
        let data = tx["data"].as_str().unwrap();
        assert!(data.starts_with("0x6080"));
        assert!(data.ends_with("2a"));
        assert_eq!(data.len(), 2 + 4 + 64);
        assert_eq!(tx["gas"], json!("0x186a0"));
        assert_eq!(tx["gasPrice"], json!("0x3b9aca00"));
    }

    #[test]
    fn test_tx_object_rejects_non_hex_args() {
        let params = TxParams {
            args: vec![json!(42)],
            ..TxParams::default()
        };
        let err = HttpChainClient::tx_object(&params).unwrap_err();
        assert!(err.message.contains("Invalid number of parameters"));
    }

    #[test]
    fn test_raw_receipt_parsing() {
        let raw: RawReceipt = serde_json::from_value(json!({
            "transactionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
            "blockNumber": "0x10",
            "contractAddress": "0x00000000000000000000000000000000000000aa",
            "gasUsed": "0x5208",
            "status": "0x1",
            "logs": []
        }))
        .unwrap();

        let receipt = raw.into_receipt().unwrap();
        assert_eq!(receipt.block_number, 16);
        assert_eq!(receipt.gas_used, 21_000);
        assert!(receipt.status);
        assert!(receipt.contract_address.is_some());
    }

    #[test]
    fn test_raw_receipt_failure_status() {
        let raw: RawReceipt = serde_json::from_value(json!({
            "transactionHash": "0x0000000000000000000000000000000000000000000000000000000000000001",
            "blockNumber": "0x10",
            "contractAddress": null,
            "gasUsed": "0x5208",
            "status": "0x0",
        }))
        .unwrap();
        assert!(!raw.into_receipt().unwrap().status);
    }
}
