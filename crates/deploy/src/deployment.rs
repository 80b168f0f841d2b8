//! Deployment orchestrator.
//!
//! A [`Deployment`] is one migration session: it owns the event bus, the
//! confirmation counter map, and every transaction handle it creates.
//! Nothing it allocates outlives the session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use alloy_core::primitives::{Address, B256};
use futures::future::{self, BoxFuture};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::artifact::{ContractArtifact, ContractInstance};
use crate::chain::{ChainClient, ClientError, TxParams};
use crate::error::DeployError;
use crate::events::{DeploymentEvent, EventBus, PreDeployInfo};
use crate::router::{DeployState, RouterMode, TxRouter};

/// Default interval between block-number polls.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(1);

/// Per-call deployment options, distinct from constructor arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// `Some(false)` keeps an existing deployment; anything else redeploys,
    /// including contracts already deployed on the network.
    pub overwrite: Option<bool>,
    pub gas: Option<u64>,
    pub gas_price: Option<u128>,
    pub from: Option<Address>,
}

/// A constructor argument that may still be pending, e.g. the address of a
/// contract an earlier migration step is deploying.
pub type DeployArg = BoxFuture<'static, Result<serde_json::Value, DeployError>>;

/// Wrap a ready value as a [`DeployArg`].
pub fn arg(value: impl Into<serde_json::Value>) -> DeployArg {
    let value = value.into();
    Box::pin(async move { Ok(value) })
}

/// Session-wide deployment options.
#[derive(Debug, Clone)]
pub struct DeploymentOptions {
    /// Blocks to wait after each deployment transaction mines before its
    /// instance resolves. Zero resolves immediately.
    pub confirmations: u64,
    /// Block-wait override handed to the client; zero defers to the client's
    /// own abandonment window.
    pub timeout_blocks: u64,
    /// Interval between block-number polls.
    pub polling_interval: Duration,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            confirmations: 0,
            timeout_blocks: 0,
            polling_interval: DEFAULT_POLLING_INTERVAL,
        }
    }
}

/// A unit of work for [`Deployment::deploy_many`].
pub struct PlannedDeploy<'a> {
    pub artifact: &'a mut ContractArtifact,
    pub args: Vec<DeployArg>,
    pub options: DeployOptions,
}

impl<'a> PlannedDeploy<'a> {
    pub fn new(artifact: &'a mut ContractArtifact) -> Self {
        Self {
            artifact,
            args: Vec::new(),
            options: DeployOptions::default(),
        }
    }
}

/// One deployment session.
pub struct Deployment {
    client: Arc<dyn ChainClient>,
    bus: EventBus,
    options: DeploymentOptions,
    /// Highest native confirmation index heard per transaction hash.
    confirmation_counts: Mutex<HashMap<B256, u64>>,
}

impl Deployment {
    pub fn new(client: Arc<dyn ChainClient>, options: DeploymentOptions) -> Self {
        Self {
            client,
            bus: EventBus::default(),
            options,
            confirmation_counts: Mutex::new(HashMap::new()),
        }
    }

    /// The session's event bus, for wiring observers.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Subscribe to the session's lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentEvent> {
        self.bus.subscribe()
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    /// Deploy a single contract.
    ///
    /// Preflights the artifact, resolves constructor arguments, applies the
    /// overwrite policy, submits, routes the transaction's events, waits the
    /// configured confirmations, and writes the result back onto the
    /// artifact. A failed deployment is fatal for the contract and is never
    /// retried.
    pub async fn deploy_one(
        &self,
        artifact: &mut ContractArtifact,
        args: Vec<DeployArg>,
        options: DeployOptions,
    ) -> Result<ContractInstance, DeployError> {
        let network_id = self.preflight(artifact).await?;
        let is_deployed = artifact.is_deployed(network_id);
        let args = future::try_join_all(args).await?;

        let should_deploy = !(is_deployed && options.overwrite == Some(false));
        let mut state = DeployState::new(&artifact.contract_name);

        let instance = if should_deploy {
            self.submit_and_track(artifact, args, &options, is_deployed, &mut state)
                .await?
        } else {
            // The recorded address exists whenever is_deployed is true.
            let address = artifact
                .deployed_address(network_id)
                .ok_or_else(|| DeployError::NetworkMismatch {
                    contract_name: artifact.contract_name.clone(),
                    network_id,
                })?;
            self.client.instance_at(artifact, address).await?
        };

        self.bus.emit(DeploymentEvent::PostDeploy {
            contract_name: artifact.contract_name.clone(),
            address: instance.address,
            deployed: should_deploy,
            receipt: state.receipt.clone(),
        });

        let confirmations = self.effective_confirmations(artifact);
        if confirmations != 0 && should_deploy {
            self.wait_blocks(confirmations, &state).await?;
        }

        artifact.record_deployment(
            network_id,
            instance.address,
            instance.transaction_hash.or(state.transaction_hash),
        );
        Ok(instance)
    }

    /// Deploy a batch of contracts as concurrently interleaved tasks.
    ///
    /// No ordering is guaranteed between members. The first failure fails
    /// the whole batch; side effects of members that already settled stand.
    pub async fn deploy_many(
        &self,
        batch: Vec<PlannedDeploy<'_>>,
    ) -> Result<Vec<ContractInstance>, DeployError> {
        let contract_names: Vec<String> = batch
            .iter()
            .map(|planned| planned.artifact.contract_name.clone())
            .collect();

        self.bus.emit(DeploymentEvent::PreDeployMany {
            contract_names: contract_names.clone(),
        });

        let deployments = batch
            .into_iter()
            .map(|planned| self.deploy_one(planned.artifact, planned.args, planned.options));
        let instances = future::try_join_all(deployments).await?;

        self.bus
            .emit(DeploymentEvent::PostDeployMany { contract_names });
        Ok(instances)
    }

    /// Reserve confirmation path: poll the counter map until the session has
    /// heard `confirmations` native confirmations for `hash`.
    pub async fn wait_for_confirmations(&self, hash: B256, confirmations: u64) {
        let mut ticker = tokio::time::interval(self.options.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let heard = self
                .confirmation_counts
                .lock()
                .ok()
                .and_then(|counts| counts.get(&hash).copied())
                .unwrap_or(0);
            if heard >= confirmations {
                return;
            }
        }
    }

    /// Clear session-duration state. Long migration runs call this between
    /// scripts so the counter map cannot grow without bound.
    pub fn close(&self) {
        if let Ok(mut counts) = self.confirmation_counts.lock() {
            counts.clear();
        }
    }

    /// Sanity checks catch-all: is the contract deployable, and does the
    /// artifact know the connected network?
    async fn preflight(&self, artifact: &ContractArtifact) -> Result<u64, DeployError> {
        if artifact.bytecode.is_empty() {
            self.bus.emit(DeploymentEvent::Error {
                contract_name: Some(artifact.contract_name.clone()),
                message: format!(
                    "{} is abstract or has no deployable bytecode",
                    artifact.contract_name
                ),
            });
            return Err(DeployError::NoBytecode {
                contract_name: artifact.contract_name.clone(),
            });
        }

        let network_id = self.client.network_id().await?;
        if artifact.network(network_id).is_none() {
            return Err(DeployError::NetworkMismatch {
                contract_name: artifact.contract_name.clone(),
                network_id,
            });
        }
        Ok(network_id)
    }

    /// Submit the deployment and drive its handle to a settled outcome.
    async fn submit_and_track(
        &self,
        artifact: &mut ContractArtifact,
        args: Vec<serde_json::Value>,
        options: &DeployOptions,
        is_deployed: bool,
        state: &mut DeployState,
    ) -> Result<ContractInstance, DeployError> {
        let block = self.client.latest_block().await?;

        let timeout_blocks = self.effective_timeout_blocks(artifact);
        artifact.timeout_blocks = timeout_blocks;

        let params = resolve_tx_params(artifact, args, options, timeout_blocks);

        let mut info = PreDeployInfo {
            contract_name: artifact.contract_name.clone(),
            deployed: is_deployed,
            block_limit: block.gas_limit,
            gas: params.gas,
            gas_price: params.gas_price,
            from: params.from,
            estimate: None,
            estimate_error: None,
        };

        // The estimate feeds previews and catches constructor reverts early;
        // a failure here is recorded, not fatal.
        match self.client.estimate_gas(&params).await {
            Ok(estimate) => info.estimate = Some(estimate),
            Err(err) => info.estimate_error = Some(err.message),
        }

        self.bus.emit(DeploymentEvent::PreDeploy(info.clone()));

        let mut handle = self.client.submit(params.clone());
        let router = TxRouter::new(
            RouterMode::Deploy,
            state,
            &params,
            &self.bus,
            self.client.as_ref(),
            &self.confirmation_counts,
        );

        let outcome = {
            // The poller is aborted when the guard drops, so the timer never
            // survives this attempt, whichever way it exits.
            let _poller = self.start_block_polling();
            router.drive(&mut handle).await
        };

        match outcome {
            Ok(outcome) => {
                let instance = outcome.instance.ok_or_else(|| {
                    DeployError::Client(ClientError::new(
                        "transaction handle completed without an instance",
                    ))
                })?;
                Ok(instance)
            }
            Err(err) => {
                self.bus.emit(DeploymentEvent::DeployFailed {
                    info,
                    error: err.to_string(),
                });
                drop(handle);
                Err(into_fatal(&artifact.contract_name, err))
            }
        }
    }

    /// Emit a `block` event for each new block heard, until the returned
    /// guard is dropped.
    fn start_block_polling(&self) -> PollerGuard {
        let client = Arc::clone(&self.client);
        let bus = self.bus.clone();
        let interval = self.options.polling_interval;

        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut current: Option<u64> = None;
            let mut blocks_waited = 0u64;

            loop {
                ticker.tick().await;
                let Ok(new_block) = client.block_number().await else {
                    continue;
                };
                match current {
                    None => current = Some(new_block),
                    Some(seen) if new_block > seen => {
                        blocks_waited += new_block - seen;
                        current = Some(new_block);
                        bus.emit(DeploymentEvent::Block {
                            block_number: new_block,
                            blocks_waited,
                            seconds_waited: started.elapsed().as_secs(),
                        });
                    }
                    Some(_) => {}
                }
            }
        });

        PollerGuard { handle }
    }

    /// Wait `blocks_to_wait` blocks after the deployment transaction mined,
    /// firing one synthesized confirmation per block heard. Native
    /// confirmation delivery over RPC transports is unreliable, so the
    /// session counts blocks itself.
    async fn wait_blocks(
        &self,
        blocks_to_wait: u64,
        state: &DeployState,
    ) -> Result<(), DeployError> {
        let mut current = self.client.block_number().await?;
        let mut blocks_heard = 0u64;
        let mut ticker = tokio::time::interval(self.options.polling_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while blocks_heard < blocks_to_wait {
            ticker.tick().await;
            let new_block = self.client.block_number().await?;
            if new_block > current {
                blocks_heard += new_block - current;
                current = new_block;
                self.bus.emit(DeploymentEvent::Confirmation {
                    contract_name: state.contract_name.clone(),
                    num: blocks_heard,
                    receipt: state.receipt.clone(),
                    block: Some(current),
                });
            }
        }
        Ok(())
    }

    fn effective_confirmations(&self, artifact: &ContractArtifact) -> u64 {
        if self.options.confirmations != 0 {
            self.options.confirmations
        } else {
            artifact.confirmations
        }
    }

    fn effective_timeout_blocks(&self, artifact: &ContractArtifact) -> u64 {
        if self.options.timeout_blocks != 0 {
            self.options.timeout_blocks
        } else {
            artifact.timeout_blocks
        }
    }
}

/// Resolve call parameters: explicit options win over artifact defaults.
fn resolve_tx_params(
    artifact: &ContractArtifact,
    args: Vec<serde_json::Value>,
    options: &DeployOptions,
    timeout_blocks: u64,
) -> TxParams {
    TxParams {
        contract_name: artifact.contract_name.clone(),
        data: artifact.bytecode.clone(),
        args,
        gas: options.gas.or(artifact.defaults.gas),
        gas_price: options.gas_price.or(artifact.defaults.gas_price),
        from: options.from.or(artifact.defaults.from),
        timeout_blocks,
    }
}

/// Client failures become the fatal per-contract error; typed deployment
/// errors (status, argument validation) pass through unchanged.
fn into_fatal(contract_name: &str, err: DeployError) -> DeployError {
    match err {
        DeployError::Client(source) => DeployError::DeploymentFailed {
            contract_name: contract_name.to_string(),
            source,
        },
        other => other,
    }
}

/// Aborts the block-polling task when dropped.
struct PollerGuard {
    handle: JoinHandle<()>,
}

impl Drop for PollerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
