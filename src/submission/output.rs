//! Per-attempt and per-request outcomes

use solana_sdk::{signature::Signature, transaction::TransactionError};
use std::fmt;

use super::errors::Cause;

/// How one attempt (or a whole request) settled.
///
/// `Confirmed` and `FailedOnChain` are authoritative answers from the ledger.
/// `Rejected` means nothing reached the ledger. `Expired` and `TimedOut`
/// leave the status open and are only ever retried through the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Confirmed(Signature),
    FailedOnChain {
        signature: Signature,
        error: TransactionError,
    },
    Rejected(Cause),
    /// The window lapsed first. `signature` is set if the node accepted it.
    Expired { signature: Option<Signature> },
    /// No definitive answer before the timer fired
    TimedOut { signature: Option<Signature> },
}

impl Outcome {
    /// Confirmed, FailedOnChain and Rejected end the request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Outcome::Confirmed(_) | Outcome::FailedOnChain { .. } | Outcome::Rejected(_)
        )
    }

    /// Ledger gave a definitive answer for the signature
    pub fn is_authoritative(&self) -> bool {
        matches!(self, Outcome::Confirmed(_) | Outcome::FailedOnChain { .. })
    }

    pub fn signature(&self) -> Option<Signature> {
        match self {
            Outcome::Confirmed(signature) | Outcome::FailedOnChain { signature, .. } => {
                Some(*signature)
            }
            Outcome::Expired { signature } | Outcome::TimedOut { signature } => *signature,
            Outcome::Rejected(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Confirmed(_) => "confirmed",
            Outcome::FailedOnChain { .. } => "failed_on_chain",
            Outcome::Rejected(_) => "rejected",
            Outcome::Expired { .. } => "expired",
            Outcome::TimedOut { .. } => "timed_out",
        }
    }

    /// Human-readable summary suitable for an end user
    pub fn summary(&self) -> String {
        match self {
            Outcome::Confirmed(signature) => format!("succeeded ({signature})"),
            Outcome::FailedOnChain { error, .. } => format!("failed on-chain ({error})"),
            Outcome::Rejected(Cause::UserDeclined) => "declined".to_string(),
            Outcome::Rejected(Cause::InsufficientResources) => "insufficient resources".to_string(),
            Outcome::Rejected(cause) => format!("failed: {cause}"),
            Outcome::Expired { .. } => "validity window expired".to_string(),
            Outcome::TimedOut {
                signature: Some(signature),
            } => format!("could not confirm in time, check signature {signature}"),
            Outcome::TimedOut { signature: None } => "could not confirm in time".to_string(),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
