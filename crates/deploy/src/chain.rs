//! The narrow contract-abstraction seam the orchestrator consumes.
//!
//! The underlying network client (signing, nonce handling, transports) lives
//! behind [`ChainClient`]. Submitting a deployment yields a [`TxHandle`] that
//! is both subscribable (a stream of lifecycle notifications) and awaitable
//! (exactly one terminal outcome).

use std::sync::Arc;

use alloy_core::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::artifact::{ContractArtifact, ContractInstance};

/// An error surfaced by the underlying network client.
///
/// The original message text is preserved verbatim so downstream
/// substring-based handling keeps working.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    pub message: String,
    /// ABI-encoded revert data, when the client surfaced any.
    pub data: Option<Bytes>,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: Bytes) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// Call parameters for a deployment submission or gas estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxParams {
    pub contract_name: String,
    /// Deployment bytecode.
    pub data: Bytes,
    /// ABI-encoded constructor arguments.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub from: Option<Address>,
    /// Blocks the caller is willing to wait; zero defers to the client's own
    /// abandonment window.
    #[serde(default)]
    pub timeout_blocks: u64,
}

/// A mined transaction receipt, narrowed to the fields the orchestrator
/// consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    /// `true` when the transaction executed successfully.
    pub status: bool,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

/// A raw event log carried by a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// An event log decoded against a contract's ABI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedLog {
    pub event: String,
    pub args: serde_json::Value,
}

/// Block header fields consumed by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub gas_limit: u64,
}

/// Lifecycle notifications delivered through a transaction handle.
///
/// The client delivers them in submission order: hash, then zero or more
/// confirmations, then receipt. Errors may arrive at any point.
#[derive(Debug, Clone)]
pub enum TxNotification {
    Hash(B256),
    Confirmation { number: u64, receipt: TxReceipt },
    Receipt(TxReceipt),
    Error(ClientError),
}

/// Handle for one in-flight submitted transaction.
///
/// Owned by the orchestrator for the duration of a single deployment attempt
/// and dropped before the attempt returns, releasing both channels.
#[derive(Debug)]
pub struct TxHandle {
    /// Lifecycle notification stream.
    pub notifications: mpsc::UnboundedReceiver<TxNotification>,
    /// The terminal outcome, produced at most once by the client.
    pub completion: oneshot::Receiver<Result<ContractInstance, ClientError>>,
}

impl TxHandle {
    /// Create a handle together with the sending halves a client keeps.
    pub fn channel() -> (TxHandleSender, TxHandle) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (complete_tx, complete_rx) = oneshot::channel();
        (
            TxHandleSender {
                notifications: notify_tx,
                completion: complete_tx,
            },
            TxHandle {
                notifications: notify_rx,
                completion: complete_rx,
            },
        )
    }
}

/// Client-side sending halves of a [`TxHandle`].
#[derive(Debug)]
pub struct TxHandleSender {
    pub notifications: mpsc::UnboundedSender<TxNotification>,
    pub completion: oneshot::Sender<Result<ContractInstance, ClientError>>,
}

impl TxHandleSender {
    /// Deliver a lifecycle notification. Delivery to a dropped handle is not
    /// an error.
    pub fn notify(&self, notification: TxNotification) {
        let _ = self.notifications.send(notification);
    }

    /// Settle the handle's terminal outcome, consuming the sender.
    pub fn complete(self, outcome: Result<ContractInstance, ClientError>) {
        let _ = self.completion.send(outcome);
    }
}

/// The contract-abstraction interface consumed by the orchestrator.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Network identifier reported by the connected node.
    async fn network_id(&self) -> Result<u64, ClientError>;

    /// Current block number.
    async fn block_number(&self) -> Result<u64, ClientError>;

    /// The latest block's header.
    async fn latest_block(&self) -> Result<BlockHeader, ClientError>;

    /// Estimate gas for a deployment without submitting it.
    async fn estimate_gas(&self, params: &TxParams) -> Result<u64, ClientError>;

    /// Submit a deployment transaction.
    ///
    /// Infallible at the call site: submission failures are delivered
    /// through the returned handle.
    fn submit(&self, params: TxParams) -> TxHandle;

    /// Fetch an instance for a contract already recorded at `address`.
    async fn instance_at(
        &self,
        artifact: &ContractArtifact,
        address: Address,
    ) -> Result<ContractInstance, ClientError>;

    /// Decode receipt logs against the contract's ABI.
    fn decode_logs(&self, contract_name: &str, logs: &[LogEntry]) -> Vec<DecodedLog>;

    /// Best-effort revert reason lookup for a transaction that mined with a
    /// failure status.
    async fn revert_reason(&self, params: &TxParams, receipt: &TxReceipt) -> Option<String> {
        let _ = (params, receipt);
        None
    }

    /// Fork this client into an ephemeral rehearsal environment.
    async fn fork(&self) -> Result<Arc<dyn ChainClient>, ClientError>;
}
