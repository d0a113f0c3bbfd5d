//! Shared fake ledger for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use reliable_tx::rpc_manager::{LedgerRpc, RpcManagerError, SendOptions};
use reliable_tx::types::{ConfirmationStrength, SignatureState, ValidityWindow};
use reliable_tx::wallet::WalletManager;

/// Blocks each window stays valid for
pub const WINDOW_SPAN: u64 = 20;

/// Ledger that loses the first `drop_first` submissions and lands the rest.
///
/// Every height query advances the chain by `blocks_per_poll`, so dropped
/// transactions eventually fall out of their window.
pub struct FlakyLedger {
    height: AtomicU64,
    blocks_per_poll: u64,
    drop_first: usize,
    reject_with: Option<RpcManagerError>,
    sends: AtomicUsize,
    windows: AtomicUsize,
    landed: Mutex<HashMap<Signature, SignatureState>>,
    accounts: Mutex<HashSet<Pubkey>>,
}

impl FlakyLedger {
    pub fn new(drop_first: usize) -> Self {
        Self {
            height: AtomicU64::new(1_000),
            blocks_per_poll: 0,
            drop_first,
            reject_with: None,
            sends: AtomicUsize::new(0),
            windows: AtomicUsize::new(0),
            landed: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashSet::new()),
        }
    }

    pub fn advancing(mut self, blocks_per_poll: u64) -> Self {
        self.blocks_per_poll = blocks_per_poll;
        self
    }

    /// Reject every submission with `err`
    pub fn rejecting(mut self, err: RpcManagerError) -> Self {
        self.reject_with = Some(err);
        self
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn windows(&self) -> usize {
        self.windows.load(Ordering::SeqCst)
    }

    pub fn landed(&self) -> usize {
        self.landed.lock().len()
    }

    pub fn is_landed(&self, signature: &Signature) -> bool {
        self.landed.lock().contains_key(signature)
    }

    pub fn add_account(&self, address: Pubkey) {
        self.accounts.lock().insert(address);
    }
}

#[async_trait]
impl LedgerRpc for FlakyLedger {
    async fn latest_validity_window(
        &self,
        _strength: ConfirmationStrength,
    ) -> Result<ValidityWindow, RpcManagerError> {
        self.windows.fetch_add(1, Ordering::SeqCst);
        let height = self.height.load(Ordering::SeqCst);
        Ok(ValidityWindow::new(Hash::new_unique(), height + WINDOW_SPAN))
    }

    async fn block_height(&self, _strength: ConfirmationStrength) -> Result<u64, RpcManagerError> {
        Ok(self.height.fetch_add(self.blocks_per_poll, Ordering::SeqCst))
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        _options: SendOptions,
    ) -> Result<Signature, RpcManagerError> {
        let index = self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.reject_with {
            return Err(err.clone());
        }
        let signature = tx.signatures[0];
        if index >= self.drop_first {
            self.landed.lock().insert(
                signature,
                SignatureState {
                    slot: self.height.load(Ordering::SeqCst),
                    err: None,
                    confirmation: Some(ConfirmationStrength::Finalized),
                },
            );
        }
        Ok(signature)
    }

    async fn signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureState>>, RpcManagerError> {
        let landed = self.landed.lock();
        Ok(signatures.iter().map(|s| landed.get(s).cloned()).collect())
    }

    async fn account_exists(
        &self,
        address: &Pubkey,
        _strength: ConfirmationStrength,
    ) -> Result<bool, RpcManagerError> {
        Ok(self.accounts.lock().contains(address))
    }
}

pub fn wallet() -> Arc<WalletManager> {
    Arc::new(WalletManager::from_keypair(Keypair::new()))
}
