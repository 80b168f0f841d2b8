//! Contract artifact descriptors and deployed instances.

use std::collections::HashMap;

use alloy_core::primitives::{Address, B256, Bytes};
use serde::{Deserialize, Serialize};

/// Where a contract ended up on one network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRecord {
    /// Address of the deployed contract, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Hash of the deployment transaction, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
}

/// Default transaction parameters configured on an artifact.
///
/// Explicit per-call options take precedence over these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u128>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
}

/// A compiled contract artifact: the unit of work for the deployment
/// orchestrator.
///
/// The orchestrator mutates the artifact in place after a successful
/// deployment, recording the address and transaction hash for the target
/// network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractArtifact {
    /// Contract name, as produced by the compiler.
    pub contract_name: String,
    /// Deployment bytecode. Empty for abstract or unlinked contracts.
    #[serde(default)]
    pub bytecode: Bytes,
    /// Per-network deployment records, keyed by network id.
    #[serde(default)]
    pub networks: HashMap<u64, NetworkRecord>,
    /// Default transaction parameters.
    #[serde(default)]
    pub defaults: TxDefaults,
    /// Blocks to wait after the deployment transaction mines before the
    /// instance resolves. Zero resolves immediately.
    #[serde(default)]
    pub confirmations: u64,
    /// Block-wait override handed to the network client. Zero defers to the
    /// client's own abandonment window.
    #[serde(default)]
    pub timeout_blocks: u64,
}

impl ContractArtifact {
    pub fn new(contract_name: impl Into<String>, bytecode: Bytes) -> Self {
        Self {
            contract_name: contract_name.into(),
            bytecode,
            networks: HashMap::new(),
            defaults: TxDefaults::default(),
            confirmations: 0,
            timeout_blocks: 0,
        }
    }

    /// The deployment record for `network_id`, if the artifact knows the
    /// network at all.
    pub fn network(&self, network_id: u64) -> Option<&NetworkRecord> {
        self.networks.get(&network_id)
    }

    /// Whether the contract has a recorded deployment on `network_id`.
    pub fn is_deployed(&self, network_id: u64) -> bool {
        self.network(network_id)
            .is_some_and(|record| record.address.is_some())
    }

    /// The recorded deployment address on `network_id`, if any.
    pub fn deployed_address(&self, network_id: u64) -> Option<Address> {
        self.network(network_id).and_then(|record| record.address)
    }

    /// Write a deployment result back onto the artifact.
    pub fn record_deployment(
        &mut self,
        network_id: u64,
        address: Address,
        transaction_hash: Option<B256>,
    ) {
        let record = self.networks.entry(network_id).or_default();
        record.address = Some(address);
        record.transaction_hash = transaction_hash;
    }
}

/// A deployed contract instance returned by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInstance {
    pub contract_name: String,
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_core::primitives::address;

    #[test]
    fn test_record_deployment_overwrites_previous() {
        let mut artifact = ContractArtifact::new("Example", Bytes::from(vec![0x60, 0x80]));
        assert!(!artifact.is_deployed(5));

        let first = address!("00000000000000000000000000000000000000aa");
        artifact.record_deployment(5, first, Some(B256::with_last_byte(1)));
        assert!(artifact.is_deployed(5));
        assert_eq!(artifact.deployed_address(5), Some(first));

        let second = address!("00000000000000000000000000000000000000bb");
        artifact.record_deployment(5, second, None);
        assert_eq!(artifact.deployed_address(5), Some(second));
        assert_eq!(artifact.network(5).unwrap().transaction_hash, None);
    }

    #[test]
    fn test_artifact_json_round_trip() {
        let mut artifact = ContractArtifact::new("Example", Bytes::from(vec![0x01]));
        artifact.defaults.gas = Some(100);
        artifact.networks.insert(1, NetworkRecord::default());

        let json = serde_json::to_string(&artifact).unwrap();
        let parsed: ContractArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, artifact);
    }
}
