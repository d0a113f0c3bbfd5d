//! RPC Manager Module
//!
//! Pooled, rate-limited access to the ledger RPC endpoints behind the
//! [`LedgerRpc`] seam used by the submission engine.

use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

use crate::types::{ConfirmationStrength, SignatureState, ValidityWindow};

// Submodules
pub mod rpc_errors;
pub mod rpc_ledger;
pub mod rpc_pool;

// Re-exports for convenience
pub use rpc_errors::RpcManagerError;
pub use rpc_ledger::RpcLedger;
pub use rpc_pool::{ConnectionPool, PoolStats};

/// Per-submission options forwarded to `sendTransaction`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub preflight_strength: ConfirmationStrength,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_strength: ConfirmationStrength::Confirmed,
        }
    }
}

/// Every network call the engine makes goes through this trait
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch a recency token and the last block height it remains valid for
    async fn latest_validity_window(
        &self,
        strength: ConfirmationStrength,
    ) -> Result<ValidityWindow, RpcManagerError>;

    /// Current block height at the given strength
    async fn block_height(&self, strength: ConfirmationStrength) -> Result<u64, RpcManagerError>;

    /// Submit a signed transaction once; the node must not rebroadcast it
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SendOptions,
    ) -> Result<Signature, RpcManagerError>;

    /// Status for each signature, `None` where the ledger has no record
    async fn signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureState>>, RpcManagerError>;

    /// Whether an account exists at `address`
    async fn account_exists(
        &self,
        address: &Pubkey,
        strength: ConfirmationStrength,
    ) -> Result<bool, RpcManagerError>;
}
