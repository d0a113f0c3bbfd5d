//! Maps raw failures onto the [`Cause`] taxonomy with a retry disposition
//!
//! | Cause                    | Disposition                          |
//! |--------------------------|--------------------------------------|
//! | ExpiredWindow            | retryable, rebuild with fresh window |
//! | ConfirmationTimeout      | retryable, bounded                   |
//! | MissingDependency        | terminal                             |
//! | InsufficientResources    | terminal                             |
//! | UserDeclined             | terminal                             |
//! | AlreadyProcessed         | terminal, treated as success         |
//! | DependencyAlreadyExists  | terminal, treated as success         |
//! | OnChainFailure           | terminal                             |
//! | Unclassified (transient) | retryable within the attempt budget  |
//! | Unclassified (other)     | terminal                             |

use solana_sdk::{instruction::InstructionError, transaction::TransactionError};

use super::errors::Cause;
use crate::rpc_manager::RpcManagerError;
use crate::wallet::SignerError;

/// A failure as observed, before classification
#[derive(Debug, Clone)]
pub enum RawFailure {
    Rpc(RpcManagerError),
    Signer(SignerError),
    /// Execution error reported for a landed transaction. `creation_prefix`
    /// is the number of leading instructions that create dependencies.
    OnChain {
        error: TransactionError,
        creation_prefix: usize,
    },
    WindowExpired,
    ConfirmationTimeout,
    Invalid(String),
}

/// Disposition of a classified failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Retryable(Cause),
    Terminal(Cause),
}

impl Classification {
    pub fn cause(&self) -> &Cause {
        match self {
            Classification::Retryable(cause) | Classification::Terminal(cause) => cause,
        }
    }

    pub fn into_cause(self) -> Cause {
        match self {
            Classification::Retryable(cause) | Classification::Terminal(cause) => cause,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Classification::Retryable(_))
    }
}

/// Classify a raw failure. Never leaves a failure unmapped.
pub fn classify(failure: &RawFailure) -> Classification {
    match failure {
        RawFailure::Rpc(err) => classify_rpc(err),
        RawFailure::Signer(SignerError::Declined(_)) => Classification::Terminal(Cause::UserDeclined),
        RawFailure::Signer(err) => Classification::Terminal(Cause::Unclassified(err.to_string())),
        RawFailure::OnChain {
            error,
            creation_prefix,
        } => classify_transaction_error(error, *creation_prefix),
        RawFailure::WindowExpired => Classification::Retryable(Cause::ExpiredWindow),
        RawFailure::ConfirmationTimeout => Classification::Retryable(Cause::ConfirmationTimeout),
        RawFailure::Invalid(reason) => Classification::Terminal(Cause::InvalidRequest(reason.clone())),
    }
}

fn classify_rpc(err: &RpcManagerError) -> Classification {
    match err {
        RpcManagerError::BlockhashNotFound { .. } | RpcManagerError::TransactionExpired { .. } => {
            Classification::Retryable(Cause::ExpiredWindow)
        }
        RpcManagerError::AlreadyProcessed { .. } => Classification::Terminal(Cause::AlreadyProcessed),
        // A payer with no record of a prior credit has nothing to pay fees with
        RpcManagerError::InsufficientFunds { .. } | RpcManagerError::AccountNotFound { .. } => {
            Classification::Terminal(Cause::InsufficientResources)
        }
        RpcManagerError::PreflightFailure { error, .. } => classify_transaction_error(error, 0),
        RpcManagerError::RpcResponse { message, .. } => match classify_by_pattern(message) {
            Some(classification) => classification,
            None if err.is_transient() => Classification::Retryable(Cause::Unclassified(err.to_string())),
            None => Classification::Terminal(Cause::Unclassified(err.to_string())),
        },
        other if other.is_transient() => Classification::Retryable(Cause::Unclassified(other.to_string())),
        other => Classification::Terminal(Cause::Unclassified(other.to_string())),
    }
}

fn classify_transaction_error(error: &TransactionError, creation_prefix: usize) -> Classification {
    match error {
        TransactionError::BlockhashNotFound => Classification::Retryable(Cause::ExpiredWindow),
        TransactionError::AlreadyProcessed => Classification::Terminal(Cause::AlreadyProcessed),
        TransactionError::InsufficientFundsForFee
        | TransactionError::InsufficientFundsForRent { .. }
        | TransactionError::AccountNotFound
        | TransactionError::InstructionError(_, InstructionError::InsufficientFunds) => {
            Classification::Terminal(Cause::InsufficientResources)
        }
        // SystemError::AccountAlreadyInUse is custom code 0; only meaningful
        // when raised by one of the prepended creation instructions
        TransactionError::InstructionError(index, InstructionError::Custom(0))
        | TransactionError::InstructionError(index, InstructionError::AccountAlreadyInitialized)
            if (*index as usize) < creation_prefix =>
        {
            Classification::Terminal(Cause::DependencyAlreadyExists)
        }
        other => Classification::Terminal(Cause::OnChainFailure(other.to_string())),
    }
}

/// Fallback for free-form RPC messages
fn classify_by_pattern(message: &str) -> Option<Classification> {
    let lower = message.to_lowercase();

    if lower.contains("user rejected") || lower.contains("user declined") {
        return Some(Classification::Terminal(Cause::UserDeclined));
    }
    if lower.contains("blockhash not found") || lower.contains("block height exceeded") {
        return Some(Classification::Retryable(Cause::ExpiredWindow));
    }
    if lower.contains("already been processed") {
        return Some(Classification::Terminal(Cause::AlreadyProcessed));
    }
    if lower.contains("insufficient funds") || lower.contains("insufficient lamports") {
        return Some(Classification::Terminal(Cause::InsufficientResources));
    }
    None
}
