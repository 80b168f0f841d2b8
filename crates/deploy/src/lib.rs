//! strudel-deploy - Deployment orchestration for smart-contract artifacts.
//!
//! This crate deploys compiled contract artifacts onto an Ethereum-style
//! network, tracking each deployment transaction through submission,
//! confirmation, and receipt, streaming structured lifecycle events to
//! observers, and guarding production networks behind a mandatory forked
//! rehearsal.

mod artifact;
mod chain;
mod config;
mod deployment;
mod error;
mod events;
mod fs;
mod http;
mod migrate;
mod reporter;
mod router;
pub mod rpc;

pub use artifact::{ContractArtifact, ContractInstance, NetworkRecord, TxDefaults};
pub use chain::{
    BlockHeader, ChainClient, ClientError, DecodedLog, LogEntry, TxHandle, TxHandleSender,
    TxNotification, TxParams, TxReceipt,
};
pub use config::{STRUDELCONF_FILENAME, StrudelConfig};
pub use deployment::{
    DEFAULT_POLLING_INTERVAL, DeployArg, DeployOptions, Deployment, DeploymentOptions,
    PlannedDeploy, arg,
};
pub use error::{DeployError, decode_revert_reason};
pub use events::{DeploymentEvent, EventBus, PreDeployInfo};
pub use http::HttpChainClient;
pub use migrate::{
    AutoApprove, DryRunApproval, MigrationContext, MigrationEnvironment, MigrationRunner,
    MigrationSettings, MigrationWorkflow, PUBLIC_NETWORK_IDS, is_production,
};
pub use reporter::spawn_reporter;
pub use router::{
    DEFAULT_TIMEOUT_BLOCKS, DeployState, MAX_CONFIRMATIONS, RouterMode, TIMEOUT_MARKER, TxOutcome,
    TxRouter,
};
