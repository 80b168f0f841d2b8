//! Scripted chain client shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use tokio::task::JoinHandle;

use strudel_deploy::{
    BlockHeader, ChainClient, ClientError, ContractArtifact, ContractInstance, DecodedLog,
    Deployment, DeploymentOptions, LogEntry, NetworkRecord, TxHandle, TxNotification, TxParams,
    TxReceipt,
};

/// One scripted notification step for a submitted transaction.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Hash,
    Confirmation(u64),
    Receipt { status: bool },
    /// The client's own block-wait abandonment error.
    TimeoutError,
    Error(&'static str),
    /// Pause between notifications.
    Wait(u64),
    /// Resolve the handle with the deployed instance.
    Complete,
}

/// The default happy-path script: hash, successful receipt, instance.
pub fn happy_path() -> Vec<Step> {
    vec![Step::Hash, Step::Receipt { status: true }, Step::Complete]
}

/// Chain client driven by per-contract scripts.
pub struct MockClient {
    pub network_id: u64,
    pub block: AtomicU64,
    pub gas_estimate: Mutex<Result<u64, String>>,
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    pub submissions: Mutex<Vec<TxParams>>,
    submission_count: AtomicU64,
}

impl MockClient {
    pub fn new(network_id: u64) -> Self {
        Self {
            network_id,
            block: AtomicU64::new(1),
            gas_estimate: Mutex::new(Ok(42_000)),
            scripts: Mutex::new(HashMap::new()),
            submissions: Mutex::new(Vec::new()),
            submission_count: AtomicU64::new(0),
        }
    }

    /// Script the next submission for `contract_name`; unscripted
    /// submissions follow the happy path.
    pub fn script_for(&self, contract_name: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(contract_name.to_string(), steps);
    }

    pub fn advance_block(&self) {
        self.block.fetch_add(1, Ordering::SeqCst);
    }

    /// Advance the chain by one block every `every` until aborted.
    pub fn spawn_block_ticker(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                client.advance_block();
            }
        })
    }
}

fn hash_for(index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&index.to_be_bytes());
    B256::from(bytes)
}

fn address_for(index: u64) -> Address {
    let mut bytes = [0u8; 20];
    bytes[12..].copy_from_slice(&index.to_be_bytes());
    Address::from(bytes)
}

#[async_trait]
impl ChainClient for MockClient {
    async fn network_id(&self) -> Result<u64, ClientError> {
        Ok(self.network_id)
    }

    async fn block_number(&self) -> Result<u64, ClientError> {
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn latest_block(&self) -> Result<BlockHeader, ClientError> {
        Ok(BlockHeader {
            number: self.block.load(Ordering::SeqCst),
            gas_limit: 8_000_000,
        })
    }

    async fn estimate_gas(&self, _params: &TxParams) -> Result<u64, ClientError> {
        self.gas_estimate
            .lock()
            .unwrap()
            .clone()
            .map_err(ClientError::new)
    }

    fn submit(&self, params: TxParams) -> TxHandle {
        let index = self.submission_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.submissions.lock().unwrap().push(params.clone());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .remove(&params.contract_name)
            .unwrap_or_else(happy_path);

        let (sender, handle) = TxHandle::channel();
        let block = self.block.load(Ordering::SeqCst);
        let contract_name = params.contract_name.clone();

        tokio::spawn(async move {
            let hash = hash_for(index);
            let address = address_for(index);
            let receipt = TxReceipt {
                transaction_hash: hash,
                block_number: block + 1,
                contract_address: Some(address),
                gas_used: 42_000,
                status: true,
                logs: Vec::new(),
            };

            let mut sender = Some(sender);
            for step in script {
                tokio::time::sleep(Duration::from_millis(2)).await;
                let Some(active) = sender.as_ref() else { break };
                match step {
                    Step::Hash => active.notify(TxNotification::Hash(hash)),
                    Step::Confirmation(number) => active.notify(TxNotification::Confirmation {
                        number,
                        receipt: receipt.clone(),
                    }),
                    Step::Receipt { status } => {
                        let mut receipt = receipt.clone();
                        receipt.status = status;
                        active.notify(TxNotification::Receipt(receipt));
                    }
                    Step::TimeoutError => active.notify(TxNotification::Error(ClientError::new(
                        "Transaction was not mined within 50 blocks, please make sure your \
                         transaction was properly sent",
                    ))),
                    Step::Error(message) => {
                        active.notify(TxNotification::Error(ClientError::new(message)));
                    }
                    Step::Wait(millis) => {
                        tokio::time::sleep(Duration::from_millis(millis)).await;
                    }
                    Step::Complete => {
                        if let Some(sender) = sender.take() {
                            sender.complete(Ok(ContractInstance {
                                contract_name: contract_name.clone(),
                                address,
                                transaction_hash: Some(hash),
                            }));
                        }
                    }
                }
            }
        });

        handle
    }

    async fn instance_at(
        &self,
        artifact: &ContractArtifact,
        address: Address,
    ) -> Result<ContractInstance, ClientError> {
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
        logs.iter()
            .map(|_| DecodedLog {
                event: "MockEvent".to_string(),
                args: serde_json::Value::Null,
            })
            .collect()
    }

    async fn fork(&self) -> Result<Arc<dyn ChainClient>, ClientError> {
        Ok(Arc::new(MockClient::new(self.network_id)))
    }
}

/// An artifact with a deployable bytecode and an entry for `network_id`.
pub fn artifact_on(network_id: u64, name: &str) -> ContractArtifact {
    let mut artifact = ContractArtifact::new(name, Bytes::from(vec![0x60, 0x80, 0x60, 0x40]));
    artifact.networks.insert(network_id, NetworkRecord::default());
    artifact
}

/// An artifact with no deployable bytecode.
pub fn abstract_artifact(network_id: u64, name: &str) -> ContractArtifact {
    let mut artifact = artifact_on(network_id, name);
    artifact.bytecode = Bytes::new();
    artifact
}

/// Session options with a polling interval suitable for tests.
pub fn fast_options() -> DeploymentOptions {
    DeploymentOptions {
        polling_interval: Duration::from_millis(5),
        ..DeploymentOptions::default()
    }
}

/// A session over the given client with fast polling.
pub fn fast_session(client: Arc<MockClient>) -> Deployment {
    Deployment::new(client, fast_options())
}

/// Drain every buffered event from a subscription.
pub fn drain_events(
    events: &mut tokio::sync::broadcast::Receiver<strudel_deploy::DeploymentEvent>,
) -> Vec<strudel_deploy::DeploymentEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
