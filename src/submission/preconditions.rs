//! Precondition resolver
//!
//! A resource dependency is an associated token account for an
//! `(owner, mint)` pair that an instruction expects to exist. The resolver
//! either confirms it exists or produces the idempotent creation instruction
//! to run ahead of the caller's instructions.

use dashmap::{DashMap, DashSet};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, transaction::TransactionError};
use spl_associated_token_account::{
    get_associated_token_address_with_program_id,
    instruction::create_associated_token_account_idempotent,
};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use super::classifier::{classify, Classification, RawFailure};
use super::engine::SubmissionEngine;
use super::errors::{Cause, TerminalFailure};
use super::output::Outcome;
use super::request::{SubmitConfig, TransactionRequest};
use crate::metrics::metrics;
use crate::rpc_manager::{LedgerRpc, RpcManagerError};
use crate::types::ConfirmationStrength;
use crate::wallet::SigningProvider;

/// Token account that must exist before a transfer can reference it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceDependency {
    pub owner: Pubkey,
    pub mint: Pubkey,
    pub token_program: Pubkey,
}

impl ResourceDependency {
    /// Associated token account of `owner` for `mint` under SPL Token
    pub fn token_account(owner: Pubkey, mint: Pubkey) -> Self {
        Self {
            owner,
            mint,
            token_program: spl_token::id(),
        }
    }

    pub fn address(&self) -> Pubkey {
        get_associated_token_address_with_program_id(&self.owner, &self.mint, &self.token_program)
    }

    /// Creation that succeeds as a no-op when the account already exists
    pub fn creation_instruction(&self, payer: &Pubkey) -> Instruction {
        create_associated_token_account_idempotent(payer, &self.owner, &self.mint, &self.token_program)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Exists,
    Create(Instruction),
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("required account {address} (owner {owner}) does not exist")]
    Missing { owner: Pubkey, address: Pubkey },

    #[error("existence check failed: {0}")]
    Rpc(#[from] RpcManagerError),

    #[error("creating {address} failed: {failure}")]
    Creation {
        address: Pubkey,
        failure: TerminalFailure,
    },

    #[error("creating {address} failed on-chain: {error}")]
    CreationFailedOnChain {
        address: Pubkey,
        error: TransactionError,
    },
}

impl ResolveError {
    /// Map onto the submission taxonomy
    pub fn cause(&self) -> Cause {
        match self {
            ResolveError::Missing { address, .. } => Cause::MissingDependency { account: *address },
            ResolveError::Rpc(e) => classify(&RawFailure::Rpc(e.clone())).into_cause(),
            ResolveError::Creation { failure, .. } => failure.cause.clone(),
            ResolveError::CreationFailedOnChain { error, .. } => Cause::OnChainFailure(error.to_string()),
        }
    }
}

pub struct PreconditionResolver {
    ledger: Arc<dyn LedgerRpc>,
    strength: ConfirmationStrength,
    auto_create: bool,
    /// Addresses observed to exist; accounts are never closed under us
    known: DashSet<Pubkey>,
    /// Single-flight guards for `ensure_exists`
    creating: DashMap<Pubkey, Arc<Mutex<()>>>,
}

impl PreconditionResolver {
    pub fn new(ledger: Arc<dyn LedgerRpc>, auto_create: bool) -> Self {
        Self {
            ledger,
            strength: ConfirmationStrength::Confirmed,
            auto_create,
            known: DashSet::new(),
            creating: DashMap::new(),
        }
    }

    pub fn with_strength(mut self, strength: ConfirmationStrength) -> Self {
        self.strength = strength;
        self
    }

    /// Check `dependency` and return the creation instruction if it is missing
    #[instrument(skip(self), fields(owner = %dependency.owner, mint = %dependency.mint))]
    pub async fn resolve(
        &self,
        dependency: &ResourceDependency,
        payer: &Pubkey,
    ) -> Result<Resolution, ResolveError> {
        let address = dependency.address();
        if self.known.contains(&address) {
            return Ok(Resolution::Exists);
        }

        if self.ledger.account_exists(&address, self.strength).await? {
            self.known.insert(address);
            return Ok(Resolution::Exists);
        }

        if !self.auto_create {
            return Err(ResolveError::Missing {
                owner: dependency.owner,
                address,
            });
        }

        debug!(%address, "Dependency missing, creation required");
        metrics().dependency_creations.inc();
        Ok(Resolution::Create(dependency.creation_instruction(payer)))
    }

    /// Resolve every dependency and put the needed creations in front of `request`
    pub async fn prepend_creations(
        &self,
        request: TransactionRequest,
        dependencies: &[ResourceDependency],
    ) -> Result<TransactionRequest, ResolveError> {
        let payer = request.fee_payer();
        let mut seen = HashSet::new();
        let mut creations = Vec::new();

        for dependency in dependencies {
            if !seen.insert(dependency.address()) {
                continue;
            }
            if let Resolution::Create(instruction) = self.resolve(dependency, &payer).await? {
                creations.push(instruction);
            }
        }

        if creations.is_empty() {
            Ok(request)
        } else {
            Ok(request.prepend_creations(creations))
        }
    }

    /// Make sure `dependency` exists, creating it in its own transaction if needed.
    ///
    /// Concurrent callers for the same dependency are serialised; the later
    /// ones find it in the cache and never submit a second creation.
    pub async fn ensure_exists(
        &self,
        engine: &SubmissionEngine,
        dependency: &ResourceDependency,
        payer: Arc<dyn SigningProvider>,
        config: &SubmitConfig,
    ) -> Result<(), ResolveError> {
        let address = dependency.address();
        if self.known.contains(&address) {
            return Ok(());
        }

        let guard = self.creating.entry(address).or_default().clone();
        let result = {
            let _lock = guard.lock().await;
            self.create_serialised(engine, dependency, payer, config).await
        };
        // Drop the single-flight entry unless another caller is queued on it
        self.creating
            .remove_if(&address, |_, lock| Arc::ptr_eq(lock, &guard) && Arc::strong_count(lock) <= 2);
        result
    }

    /// Body of `ensure_exists`, run while holding the per-address lock
    async fn create_serialised(
        &self,
        engine: &SubmissionEngine,
        dependency: &ResourceDependency,
        payer: Arc<dyn SigningProvider>,
        config: &SubmitConfig,
    ) -> Result<(), ResolveError> {
        let address = dependency.address();
        let instruction = match self.resolve(dependency, &payer.pubkey()).await? {
            Resolution::Exists => return Ok(()),
            Resolution::Create(instruction) => instruction,
        };

        let request = TransactionRequest::new(Vec::new(), payer)
            .with_config(config.clone())
            .prepend_creations(vec![instruction]);

        match engine.submit(request).await {
            Ok(Outcome::Confirmed(signature)) => {
                info!(%address, %signature, "Dependency created");
                self.mark_exists(address);
                Ok(())
            }
            Ok(Outcome::FailedOnChain { error, .. }) => {
                let raced = classify(&RawFailure::OnChain {
                    error: error.clone(),
                    creation_prefix: 1,
                });
                if raced == Classification::Terminal(Cause::DependencyAlreadyExists) {
                    self.mark_exists(address);
                    Ok(())
                } else {
                    Err(ResolveError::CreationFailedOnChain { address, error })
                }
            }
            Ok(other) => Err(ResolveError::Creation {
                address,
                failure: TerminalFailure::new(
                    Cause::Unclassified(format!("unexpected outcome: {}", other.label())),
                    other.signature(),
                    0,
                ),
            }),
            Err(failure) => {
                // A concurrent creator outside this process may have won
                if self.ledger.account_exists(&address, self.strength).await? {
                    self.mark_exists(address);
                    return Ok(());
                }
                Err(ResolveError::Creation { address, failure })
            }
        }
    }

    fn mark_exists(&self, address: Pubkey) {
        self.known.insert(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockLedger, MockSigner};

    #[test]
    fn test_address_matches_spl_derivation() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let dependency = ResourceDependency::token_account(owner, mint);
        assert_eq!(
            dependency.address(),
            spl_associated_token_account::get_associated_token_address(&owner, &mint)
        );
    }

    #[tokio::test]
    async fn test_existing_account_is_noop() {
        let ledger = Arc::new(MockLedger::new());
        let dependency = ResourceDependency::token_account(Pubkey::new_unique(), Pubkey::new_unique());
        ledger.add_account(dependency.address());

        let resolver = PreconditionResolver::new(ledger.clone(), true);
        let payer = Pubkey::new_unique();
        assert_eq!(resolver.resolve(&dependency, &payer).await.unwrap(), Resolution::Exists);

        // Cached afterwards
        assert_eq!(resolver.resolve(&dependency, &payer).await.unwrap(), Resolution::Exists);
        assert_eq!(ledger.account_queries(), 1);
    }

    #[tokio::test]
    async fn test_missing_account_creates() {
        let ledger = Arc::new(MockLedger::new());
        let dependency = ResourceDependency::token_account(Pubkey::new_unique(), Pubkey::new_unique());
        let payer = Pubkey::new_unique();

        let resolver = PreconditionResolver::new(ledger, true);
        match resolver.resolve(&dependency, &payer).await.unwrap() {
            Resolution::Create(ix) => {
                assert_eq!(ix.program_id, spl_associated_token_account::id());
                assert_eq!(ix.accounts[1].pubkey, dependency.address());
            }
            Resolution::Exists => panic!("expected a creation instruction"),
        }
    }

    #[tokio::test]
    async fn test_missing_without_auto_create() {
        let ledger = Arc::new(MockLedger::new());
        let dependency = ResourceDependency::token_account(Pubkey::new_unique(), Pubkey::new_unique());

        let resolver = PreconditionResolver::new(ledger, false);
        let err = resolver.resolve(&dependency, &Pubkey::new_unique()).await.unwrap_err();
        assert!(matches!(err, ResolveError::Missing { .. }));
        assert_eq!(
            err.cause(),
            Cause::MissingDependency {
                account: dependency.address()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_entries_released_after_failure() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_default_send(crate::test_utils::SendBehavior::Fail(RpcManagerError::InsufficientFunds {
            endpoint: "mock".to_string(),
        }));
        let engine = SubmissionEngine::new(ledger.clone());
        let resolver = PreconditionResolver::new(ledger, true);
        let payer: Arc<dyn SigningProvider> = Arc::new(MockSigner::new());

        for _ in 0..3 {
            let dependency = ResourceDependency::token_account(Pubkey::new_unique(), Pubkey::new_unique());
            let err = resolver
                .ensure_exists(&engine, &dependency, payer.clone(), &SubmitConfig::default())
                .await
                .unwrap_err();
            assert_eq!(err.cause(), Cause::InsufficientResources);
        }
        assert!(resolver.creating.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_entries_released_after_success() {
        let ledger = Arc::new(MockLedger::new());
        let engine = SubmissionEngine::new(ledger.clone());
        let resolver = PreconditionResolver::new(ledger.clone(), true);
        let payer: Arc<dyn SigningProvider> = Arc::new(MockSigner::new());
        let created = ResourceDependency::token_account(Pubkey::new_unique(), Pubkey::new_unique());
        let existing = ResourceDependency::token_account(Pubkey::new_unique(), Pubkey::new_unique());
        ledger.add_account(existing.address());

        for dependency in [created, existing] {
            resolver
                .ensure_exists(&engine, &dependency, payer.clone(), &SubmitConfig::default())
                .await
                .unwrap();
        }
        assert!(resolver.creating.is_empty());
    }

    #[tokio::test]
    async fn test_prepend_deduplicates() {
        let ledger = Arc::new(MockLedger::new());
        let payer = Arc::new(MockSigner::new());
        let dependency = ResourceDependency::token_account(Pubkey::new_unique(), Pubkey::new_unique());
        let transfer = solana_sdk::system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);

        let resolver = PreconditionResolver::new(ledger, true);
        let request = TransactionRequest::new(vec![transfer.clone()], payer);
        let request = resolver
            .prepend_creations(request, &[dependency, dependency])
            .await
            .unwrap();

        assert_eq!(request.creation_prefix(), 1);
        assert_eq!(request.instructions().len(), 2);
        assert_eq!(request.instructions()[1], transfer);
    }
}
