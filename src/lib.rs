//! Reliable transaction submission for Solana
//!
//! Builds, signs, submits and confirms transactions against a ledger whose
//! validity windows expire quickly and whose RPC path is unreliable. Each
//! request is retried under fresh validity windows within a bounded budget,
//! and every failure is classified into a closed set of causes.
//!
//! Entry points:
//! - [`submission::SubmissionEngine::submit`] drives one request to a final result
//! - [`submission::PreconditionResolver`] makes sure token accounts exist first
//! - [`rpc_manager::RpcLedger`] is the pooled, rate-limited ledger access

pub mod config;
pub mod metrics;
pub mod observability;
pub mod structured_logging;
pub mod submission;
pub mod types;
pub mod wallet;

#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;

pub mod test_utils;

// Re-export commonly used types
pub use solana_sdk::{pubkey::Pubkey, signature::Signature};
pub use submission::{Outcome, SubmissionEngine, TerminalFailure, TransactionRequest};

#[cfg(test)]
mod tests {
    mod engine_scenarios;
    mod resolver_concurrency;
    mod retry_properties;
}
