//! Transaction requests and their submission settings

use serde::{Deserialize, Serialize};
use solana_sdk::{instruction::Instruction, pubkey::Pubkey};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::backoff::RetryBackoff;
use super::errors::Cause;
use crate::observability::CorrelationId;
use crate::types::ConfirmationStrength;
use crate::wallet::SigningProvider;

/// Retry and confirmation settings for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitConfig {
    /// Maximum number of attempts, each under its own validity window
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// How long one attempt waits for a definitive status
    #[serde(default = "default_per_attempt_timeout_ms")]
    pub per_attempt_timeout_ms: u64,

    #[serde(default)]
    pub skip_preflight: bool,

    /// Strength required before a transaction counts as settled
    #[serde(default)]
    pub commitment: ConfirmationStrength,
}

fn default_max_retries() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 500 }
fn default_max_delay_ms() -> u64 { 8_000 }
fn default_per_attempt_timeout_ms() -> u64 { 60_000 }

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            per_attempt_timeout_ms: default_per_attempt_timeout_ms(),
            skip_preflight: false,
            commitment: ConfirmationStrength::default(),
        }
    }
}

impl SubmitConfig {
    pub fn backoff(&self) -> RetryBackoff {
        RetryBackoff::new(self.base_delay_ms, self.max_delay_ms)
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.per_attempt_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        if self.per_attempt_timeout_ms == 0 {
            return Err("per_attempt_timeout_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Instructions to land on the ledger together with the identities that sign them.
///
/// The request never changes during submission except through the engine's
/// own bookkeeping of prepended creation instructions.
#[derive(Clone)]
pub struct TransactionRequest {
    instructions: Vec<Instruction>,
    fee_payer: Arc<dyn SigningProvider>,
    signers: Vec<Arc<dyn SigningProvider>>,
    config: SubmitConfig,
    /// Leading instructions that create dependencies
    creation_prefix: usize,
    correlation_id: CorrelationId,
}

impl fmt::Debug for TransactionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRequest")
            .field("correlation_id", &self.correlation_id)
            .field("instructions", &self.instructions.len())
            .field("fee_payer", &self.fee_payer.pubkey())
            .field(
                "signers",
                &self.signers.iter().map(|s| s.pubkey()).collect::<Vec<_>>(),
            )
            .field("creation_prefix", &self.creation_prefix)
            .field("config", &self.config)
            .finish()
    }
}

impl TransactionRequest {
    pub fn new(instructions: Vec<Instruction>, fee_payer: Arc<dyn SigningProvider>) -> Self {
        Self {
            instructions,
            fee_payer,
            signers: Vec::new(),
            config: SubmitConfig::default(),
            creation_prefix: 0,
            correlation_id: CorrelationId::new(),
        }
    }

    /// Add a signer besides the fee payer
    pub fn with_signer(mut self, signer: Arc<dyn SigningProvider>) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn with_config(mut self, config: SubmitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Put dependency creation instructions ahead of the caller's instructions
    pub fn prepend_creations(mut self, creations: Vec<Instruction>) -> Self {
        self.creation_prefix += creations.len();
        let mut instructions = creations;
        instructions.append(&mut self.instructions);
        self.instructions = instructions;
        self
    }

    /// Drop every prepended creation instruction
    pub(crate) fn strip_creations(&mut self) -> usize {
        let stripped = self.creation_prefix;
        self.instructions.drain(..stripped);
        self.creation_prefix = 0;
        stripped
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn fee_payer(&self) -> Pubkey {
        self.fee_payer.pubkey()
    }

    pub fn config(&self) -> &SubmitConfig {
        &self.config
    }

    pub fn creation_prefix(&self) -> usize {
        self.creation_prefix
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Signing provider for `pubkey`, fee payer first
    pub(crate) fn provider_for(&self, pubkey: &Pubkey) -> Option<&Arc<dyn SigningProvider>> {
        std::iter::once(&self.fee_payer)
            .chain(self.signers.iter())
            .find(|provider| provider.pubkey() == *pubkey)
    }

    /// Client-side checks performed before any network call
    pub fn validate(&self) -> Result<(), Cause> {
        if self.instructions.is_empty() {
            return Err(Cause::InvalidRequest("request has no instructions".to_string()));
        }
        self.config.validate().map_err(Cause::InvalidRequest)?;

        let mut seen = HashSet::new();
        seen.insert(self.fee_payer.pubkey());
        for signer in &self.signers {
            if !seen.insert(signer.pubkey()) {
                return Err(Cause::InvalidRequest(format!(
                    "signer {} supplied more than once",
                    signer.pubkey()
                )));
            }
        }
        Ok(())
    }
}
