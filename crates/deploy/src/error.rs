//! Deployment error taxonomy.

use alloy_core::primitives::B256;
use thiserror::Error;

use crate::chain::{ClientError, TxParams, TxReceipt};

/// Errors produced while deploying a contract.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The artifact carries no deployable bytecode (abstract contract, or a
    /// library placeholder that was never linked).
    #[error("{contract_name} is abstract or has no deployable bytecode")]
    NoBytecode { contract_name: String },

    /// The artifact has no entry for the network the client is connected to.
    #[error("{contract_name} has no entry for network id {network_id}")]
    NetworkMismatch {
        contract_name: String,
        network_id: u64,
    },

    /// The transaction mined with a failure status.
    #[error("transaction {transaction_hash} mined with failure status{}", fmt_reason(.reason))]
    TransactionStatus {
        params: Box<TxParams>,
        transaction_hash: B256,
        receipt: Box<TxReceipt>,
        /// Decoded revert reason, when one was recoverable.
        reason: Option<String>,
    },

    /// Malformed call arguments, surfaced verbatim from the network client.
    #[error("{0}")]
    InvalidArguments(String),

    /// Fatal per-contract deployment failure. Deployments are never retried.
    #[error("deployment of {contract_name} failed: {source}")]
    DeploymentFailed {
        contract_name: String,
        #[source]
        source: ClientError,
    },

    #[error(transparent)]
    Client(#[from] ClientError),
}

fn fmt_reason(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(", reverted with: {reason}"),
        None => String::new(),
    }
}

/// Selector of the canonical `Error(string)` revert payload.
const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Decode an ABI-encoded `Error(string)` payload into its reason string.
///
/// Returns `None` for anything that does not match the canonical revert
/// shape, including custom errors and empty reverts.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    if data.len() < 4 + 64 || data[..4] != ERROR_SELECTOR {
        return None;
    }
    let words = &data[4..];
    let offset = read_usize_word(words.get(..32)?)?;
    let length_end = offset.checked_add(32)?;
    let length = read_usize_word(words.get(offset..length_end)?)?;
    let bytes = words.get(length_end..length_end.checked_add(length)?)?;
    String::from_utf8(bytes.to_vec()).ok()
}

/// Read a 32-byte ABI word as a usize, rejecting values that overflow.
fn read_usize_word(word: &[u8]) -> Option<usize> {
    if word.len() != 32 || word[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&word[24..]);
    Some(u64::from_be_bytes(buf) as usize)
}
