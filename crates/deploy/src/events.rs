//! Deployment lifecycle events and the broadcast bus observers subscribe to.

use alloy_core::primitives::{Address, B256};
use tokio::sync::broadcast;

use crate::chain::TxReceipt;

/// Default buffer size for the event bus.
const DEFAULT_CAPACITY: usize = 256;

/// Snapshot of everything known about a deployment right before submission.
///
/// Also carried by [`DeploymentEvent::DeployFailed`] so reporters can show
/// the parameters of the attempt that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreDeployInfo {
    pub contract_name: String,
    /// Whether the contract was already deployed on this network before the
    /// attempt.
    pub deployed: bool,
    /// Gas limit of the current block.
    pub block_limit: u64,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub from: Option<Address>,
    /// Gas estimate, when the estimation call succeeded.
    pub estimate: Option<u64>,
    /// Estimation failure text; estimation failures never abort a deployment.
    pub estimate_error: Option<String>,
}

/// Events surfaced by a deployment session.
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    PreDeploy(PreDeployInfo),
    PostDeploy {
        contract_name: String,
        address: Address,
        /// Whether this attempt actually submitted a transaction.
        deployed: bool,
        receipt: Option<TxReceipt>,
    },
    PreDeployMany {
        contract_names: Vec<String>,
    },
    PostDeployMany {
        contract_names: Vec<String>,
    },
    /// A new block was observed while waiting on a pending transaction.
    Block {
        block_number: u64,
        blocks_waited: u64,
        seconds_waited: u64,
    },
    /// A confirmation for a mined transaction. `block` is set for
    /// confirmations the orchestrator synthesizes by counting blocks itself,
    /// absent for native re-emissions from the client.
    Confirmation {
        contract_name: String,
        num: u64,
        receipt: Option<TxReceipt>,
        block: Option<u64>,
    },
    TransactionHash {
        contract_name: String,
        transaction_hash: B256,
    },
    Receipt {
        contract_name: String,
        receipt: TxReceipt,
    },
    /// A deployment attempt failed after `PreDeploy` was emitted.
    DeployFailed {
        info: PreDeployInfo,
        error: String,
    },
    /// An error surfaced outside the submit/receipt path.
    Error {
        contract_name: Option<String>,
        message: String,
    },
}

/// Broadcast fan-out for deployment lifecycle events.
///
/// Emission is lossy by design: a session with no observers runs fine, and a
/// lagging observer misses events rather than stalling deployments.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeploymentEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: DeploymentEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.emit(DeploymentEvent::PreDeployMany {
            contract_names: vec!["Example".to_string()],
        });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        bus.emit(DeploymentEvent::Block {
            block_number: 10,
            blocks_waited: 1,
            seconds_waited: 2,
        });

        match events.recv().await.unwrap() {
            DeploymentEvent::Block {
                block_number,
                blocks_waited,
                seconds_waited,
            } => {
                assert_eq!(block_number, 10);
                assert_eq!(blocks_waited, 1);
                assert_eq!(seconds_waited, 2);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
