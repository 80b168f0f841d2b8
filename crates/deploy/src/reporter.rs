//! Tracing-backed observer of the deployment event stream.

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::events::{DeploymentEvent, EventBus};

/// Subscribe to the bus and log every event until the session is dropped.
pub fn spawn_reporter(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Reporter fell behind the event stream");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &DeploymentEvent) {
    match event {
        DeploymentEvent::PreDeploy(info) => {
            tracing::info!(
                contract = %info.contract_name,
                deployed = info.deployed,
                block_limit = info.block_limit,
                gas = ?info.gas,
                gas_price = ?info.gas_price,
                from = ?info.from,
                estimate = ?info.estimate,
                estimate_error = ?info.estimate_error,
                "Deploying contract..."
            );
        }
        DeploymentEvent::PostDeploy {
            contract_name,
            address,
            deployed,
            ..
        } => {
            if *deployed {
                tracing::info!(contract = %contract_name, address = %address, "Contract deployed");
            } else {
                tracing::info!(contract = %contract_name, address = %address, "Using existing deployment");
            }
        }
        DeploymentEvent::PreDeployMany { contract_names } => {
            tracing::info!(contracts = ?contract_names, "Deploying batch...");
        }
        DeploymentEvent::PostDeployMany { contract_names } => {
            tracing::info!(contracts = ?contract_names, "Batch deployed");
        }
        DeploymentEvent::Block {
            block_number,
            blocks_waited,
            seconds_waited,
        } => {
            tracing::info!(
                block_number,
                blocks_waited,
                seconds_waited,
                "Waiting for transaction..."
            );
        }
        DeploymentEvent::Confirmation {
            contract_name,
            num,
            block,
            ..
        } => {
            tracing::info!(contract = %contract_name, num, block = ?block, "Confirmation");
        }
        DeploymentEvent::TransactionHash {
            contract_name,
            transaction_hash,
        } => {
            tracing::info!(contract = %contract_name, hash = %transaction_hash, "Transaction submitted");
        }
        DeploymentEvent::Receipt { contract_name, receipt } => {
            tracing::info!(
                contract = %contract_name,
                hash = %receipt.transaction_hash,
                block = receipt.block_number,
                gas_used = receipt.gas_used,
                "Receipt received"
            );
        }
        DeploymentEvent::DeployFailed { info, error } => {
            tracing::error!(contract = %info.contract_name, error = %error, "Deployment failed");
        }
        DeploymentEvent::Error {
            contract_name,
            message,
        } => {
            tracing::error!(contract = ?contract_name, error = %message, "Error");
        }
    }
}
