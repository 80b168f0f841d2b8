//! Transaction event router.
//!
//! Drives one [`TxHandle`]'s notification stream to exactly one settled
//! outcome. The router is an explicit state machine: every transition
//! performs its side effect once, so double delivery is structurally
//! impossible rather than a matter of listener-detachment discipline.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy_core::primitives::B256;

use crate::artifact::ContractInstance;
use crate::chain::{ChainClient, ClientError, DecodedLog, TxHandle, TxNotification, TxParams, TxReceipt};
use crate::error::DeployError;
use crate::events::{DeploymentEvent, EventBus};

/// Highest confirmation index the client delivers for one transaction.
/// Indices start at zero, so this caps the stream at 25 deliveries; the
/// stream is unbounded and must not accumulate forever.
pub const MAX_CONFIRMATIONS: u64 = 24;

/// Blocks the network client waits on its own before abandoning a pending
/// transaction.
pub const DEFAULT_TIMEOUT_BLOCKS: u64 = 50;

/// Marker substring of the client's block-wait abandonment error.
pub const TIMEOUT_MARKER: &str = "50 blocks";

/// Transient record of one deployment attempt. Owned exclusively by the
/// attempt and discarded after it settles; the receipt is never replaced
/// once set.
#[derive(Debug, Clone, Default)]
pub struct DeployState {
    pub contract_name: String,
    pub transaction_hash: Option<B256>,
    pub receipt: Option<TxReceipt>,
}

impl DeployState {
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            transaction_hash: None,
            receipt: None,
        }
    }
}

/// What the router is settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterMode {
    /// A contract deployment: the receipt is stored and the handle's
    /// completion supplies the instance.
    Deploy,
    /// A plain method call: settled directly from the receipt.
    Call,
}

/// Settled outcome of one routed transaction.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub transaction_hash: B256,
    pub receipt: TxReceipt,
    pub logs: Vec<DecodedLog>,
    /// Present in deploy mode only.
    pub instance: Option<ContractInstance>,
}

/// Router phase. Settlement is the function return, so `Settled` needs no
/// phase of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Submitted,
    HashReceived,
    Confirming,
    Received,
}

/// Routes one transaction handle's notifications into pass-through events
/// plus a single terminal outcome.
pub struct TxRouter<'a> {
    mode: RouterMode,
    phase: Phase,
    state: &'a mut DeployState,
    params: &'a TxParams,
    bus: &'a EventBus,
    client: &'a dyn ChainClient,
    confirmation_counts: &'a Mutex<HashMap<B256, u64>>,
    logs: Vec<DecodedLog>,
    muted_confirmations: bool,
}

impl<'a> TxRouter<'a> {
    pub fn new(
        mode: RouterMode,
        state: &'a mut DeployState,
        params: &'a TxParams,
        bus: &'a EventBus,
        client: &'a dyn ChainClient,
        confirmation_counts: &'a Mutex<HashMap<B256, u64>>,
    ) -> Self {
        Self {
            mode,
            phase: Phase::Submitted,
            state,
            params,
            bus,
            client,
            confirmation_counts,
            logs: Vec::new(),
            muted_confirmations: false,
        }
    }

    /// Drive the handle to its terminal outcome. Returns exactly once.
    pub async fn drive(mut self, handle: &mut TxHandle) -> Result<TxOutcome, DeployError> {
        loop {
            match handle.notifications.recv().await {
                Some(TxNotification::Hash(hash)) => self.on_hash(hash),
                Some(TxNotification::Confirmation { number, receipt }) => {
                    self.on_confirmation(number, receipt);
                }
                Some(TxNotification::Receipt(receipt)) => {
                    if let Some(outcome) = self.on_receipt(receipt).await? {
                        // A method call settles right at the receipt.
                        return Ok(outcome);
                    }
                    if self.phase == Phase::Received {
                        // Deployment: the handle's completion carries the instance.
                        return self.await_completion(handle).await;
                    }
                }
                Some(TxNotification::Error(err)) => {
                    if self.squashes_timeout(&err) {
                        tracing::debug!(
                            contract = %self.state.contract_name,
                            timeout_blocks = self.params.timeout_blocks,
                            "Squashed block-wait abandonment; a longer wait is configured"
                        );
                        continue;
                    }
                    self.bus.emit(DeploymentEvent::Error {
                        contract_name: Some(self.state.contract_name.clone()),
                        message: err.message.clone(),
                    });
                    // Settle directly from the error arm. The completion
                    // channel would surface the same failure eventually, but
                    // this transition keeps an error terminal even if the
                    // client never completes the handle.
                    return Err(classify_client_error(err));
                }
                None => {
                    // Stream closed without a receipt or error.
                    return self.await_completion(handle).await;
                }
            }
        }
    }

    /// The protocol delivers the hash at most once; anything after the first
    /// is ignored.
    fn on_hash(&mut self, hash: B256) {
        if self.phase != Phase::Submitted {
            return;
        }
        self.state.transaction_hash = Some(hash);
        self.bus.emit(DeploymentEvent::TransactionHash {
            contract_name: self.state.contract_name.clone(),
            transaction_hash: hash,
        });
        self.phase = Phase::HashReceived;
    }

    fn on_confirmation(&mut self, number: u64, receipt: TxReceipt) {
        if self.muted_confirmations {
            return;
        }
        if let Ok(mut counts) = self.confirmation_counts.lock() {
            counts.insert(receipt.transaction_hash, number);
        }
        self.bus.emit(DeploymentEvent::Confirmation {
            contract_name: self.state.contract_name.clone(),
            num: number,
            receipt: Some(receipt),
            block: None,
        });
        if self.phase == Phase::HashReceived {
            self.phase = Phase::Confirming;
        }
        if number >= MAX_CONFIRMATIONS {
            self.muted_confirmations = true;
        }
    }

    /// Handle a receipt. Returns `Some` when the outcome settles here (call
    /// mode), `None` when the deployment flow settles later or the delivery
    /// was a duplicate.
    async fn on_receipt(&mut self, receipt: TxReceipt) -> Result<Option<TxOutcome>, DeployError> {
        if self.state.receipt.is_some() || self.phase == Phase::Received {
            return Ok(None);
        }

        self.logs = if receipt.logs.is_empty() {
            Vec::new()
        } else {
            self.client
                .decode_logs(&self.state.contract_name, &receipt.logs)
        };

        self.bus.emit(DeploymentEvent::Receipt {
            contract_name: self.state.contract_name.clone(),
            receipt: receipt.clone(),
        });

        if !receipt.status {
            let reason = self.client.revert_reason(self.params, &receipt).await;
            return Err(DeployError::TransactionStatus {
                params: Box::new(self.params.clone()),
                transaction_hash: receipt.transaction_hash,
                receipt: Box::new(receipt),
                reason,
            });
        }

        self.state.receipt = Some(receipt.clone());
        self.phase = Phase::Received;

        match self.mode {
            RouterMode::Call => Ok(Some(TxOutcome {
                transaction_hash: receipt.transaction_hash,
                receipt,
                logs: std::mem::take(&mut self.logs),
                instance: None,
            })),
            RouterMode::Deploy => Ok(None),
        }
    }

    /// Await the handle's terminal outcome and fold it with the stored
    /// receipt.
    async fn await_completion(self, handle: &mut TxHandle) -> Result<TxOutcome, DeployError> {
        match (&mut handle.completion).await {
            Ok(Ok(instance)) => {
                let receipt = self.state.receipt.clone().ok_or_else(|| {
                    DeployError::Client(ClientError::new(
                        "transaction completed without delivering a receipt",
                    ))
                })?;
                Ok(TxOutcome {
                    transaction_hash: receipt.transaction_hash,
                    receipt,
                    logs: self.logs,
                    instance: Some(instance),
                })
            }
            Ok(Err(err)) => {
                self.bus.emit(DeploymentEvent::Error {
                    contract_name: Some(self.state.contract_name.clone()),
                    message: err.message.clone(),
                });
                Err(classify_client_error(err))
            }
            Err(_) => Err(DeployError::Client(ClientError::new(
                "transaction handle dropped before settling",
            ))),
        }
    }

    /// Block-wait abandonment from the client is a false positive while the
    /// caller configured a longer wait.
    fn squashes_timeout(&self, err: &ClientError) -> bool {
        err.message.contains(TIMEOUT_MARKER)
            && self.params.timeout_blocks > DEFAULT_TIMEOUT_BLOCKS
    }
}

/// Argument-validation failures keep the client's message text verbatim;
/// everything else passes through as a client error.
fn classify_client_error(err: ClientError) -> DeployError {
    if err.message.contains("Invalid number of parameters") {
        DeployError::InvalidArguments(err.message)
    } else {
        DeployError::Client(err)
    }
}
