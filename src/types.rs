//! Shared ledger-facing types used across the RPC layer and the submission engine

use serde::{Deserialize, Serialize};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, transaction::TransactionError,
};
use solana_transaction_status::TransactionConfirmationStatus;
use std::fmt;
use std::str::FromStr;

/// Level of finality required before a transaction counts as settled.
///
/// Ordered from weakest to strongest so that `observed >= required`
/// answers "is this status good enough".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStrength {
    Processed,
    Confirmed,
    Finalized,
}

impl ConfirmationStrength {
    pub fn commitment(&self) -> CommitmentConfig {
        match self {
            Self::Processed => CommitmentConfig::processed(),
            Self::Confirmed => CommitmentConfig::confirmed(),
            Self::Finalized => CommitmentConfig::finalized(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processed => "processed",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
        }
    }
}

impl Default for ConfirmationStrength {
    fn default() -> Self {
        Self::Confirmed
    }
}

impl fmt::Display for ConfirmationStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfirmationStrength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "confirmed" => Ok(Self::Confirmed),
            "finalized" | "finalised" => Ok(Self::Finalized),
            other => Err(format!("unknown confirmation strength: {other}")),
        }
    }
}

impl From<TransactionConfirmationStatus> for ConfirmationStrength {
    fn from(status: TransactionConfirmationStatus) -> Self {
        match status {
            TransactionConfirmationStatus::Processed => Self::Processed,
            TransactionConfirmationStatus::Confirmed => Self::Confirmed,
            TransactionConfirmationStatus::Finalized => Self::Finalized,
        }
    }
}

/// Recency token plus the last block height at which it is still accepted.
///
/// A transaction signed under this window is dead once the ledger's block
/// height passes `last_valid_block_height`; it can never be resubmitted and
/// must be rebuilt under a fresh window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidityWindow {
    pub blockhash: Hash,
    pub last_valid_block_height: u64,
}

impl ValidityWindow {
    pub fn new(blockhash: Hash, last_valid_block_height: u64) -> Self {
        Self {
            blockhash,
            last_valid_block_height,
        }
    }

    /// True once `current_height` is beyond the window
    pub fn is_expired_at(&self, current_height: u64) -> bool {
        current_height > self.last_valid_block_height
    }
}

impl fmt::Display for ValidityWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.blockhash, self.last_valid_block_height)
    }
}

/// Status of a signature as reported by the ledger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureState {
    pub slot: u64,
    /// On-chain execution error, if the transaction landed but failed
    pub err: Option<TransactionError>,
    /// Strongest finality reached so far; `None` when the node did not report one
    pub confirmation: Option<ConfirmationStrength>,
}

impl SignatureState {
    /// Whether this status is a definitive answer at the `required` strength
    pub fn satisfies(&self, required: ConfirmationStrength) -> bool {
        match self.confirmation {
            Some(observed) => observed >= required,
            // Nodes drop confirmation_status for rooted slots
            None => true,
        }
    }
}
