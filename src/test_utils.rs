//! Test Utilities Module
//!
//! In-memory stand-ins for the ledger and for signing providers, so the
//! submission engine can be driven deterministically without a network.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    transaction::{TransactionError, VersionedTransaction},
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use crate::rpc_manager::{LedgerRpc, RpcManagerError, SendOptions};
use crate::types::{ConfirmationStrength, SignatureState, ValidityWindow};
use crate::wallet::{SignerError, SigningProvider};

const MOCK_ENDPOINT: &str = "mock://ledger";

/// Blocks a fresh window stays valid for when none is scripted
const DEFAULT_WINDOW_SPAN: u64 = 150;

/// What the mock does with the next submitted transaction
#[derive(Debug, Clone)]
pub enum SendBehavior {
    /// Accept it and report it landed with `err` at `confirmation`
    Land {
        err: Option<TransactionError>,
        confirmation: ConfirmationStrength,
    },
    /// Accept it but never report a status
    Drop,
    /// Reject the submission
    Fail(RpcManagerError),
}

impl SendBehavior {
    pub fn confirmed() -> Self {
        SendBehavior::Land {
            err: None,
            confirmation: ConfirmationStrength::Confirmed,
        }
    }

    pub fn failed_on_chain(err: TransactionError) -> Self {
        SendBehavior::Land {
            err: Some(err),
            confirmation: ConfirmationStrength::Confirmed,
        }
    }
}

/// Scriptable in-memory ledger
pub struct MockLedger {
    height: AtomicU64,
    windows: Mutex<VecDeque<ValidityWindow>>,
    sends: Mutex<VecDeque<SendBehavior>>,
    default_send: Mutex<SendBehavior>,
    statuses: Mutex<HashMap<Signature, SignatureState>>,
    accounts: Mutex<HashSet<Pubkey>>,
    sent: Mutex<Vec<VersionedTransaction>>,
    failing_status_queries: AtomicU32,

    windows_fetched: AtomicUsize,
    send_calls: AtomicUsize,
    status_queries: AtomicUsize,
    account_queries: AtomicUsize,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    /// Ledger at height 100 that confirms everything it receives
    pub fn new() -> Self {
        Self {
            height: AtomicU64::new(100),
            windows: Mutex::new(VecDeque::new()),
            sends: Mutex::new(VecDeque::new()),
            default_send: Mutex::new(SendBehavior::confirmed()),
            statuses: Mutex::new(HashMap::new()),
            accounts: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
            failing_status_queries: AtomicU32::new(0),
            windows_fetched: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            status_queries: AtomicUsize::new(0),
            account_queries: AtomicUsize::new(0),
        }
    }

    pub fn set_block_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Queue the window returned by the next fetch
    pub fn push_window(&self, window: ValidityWindow) {
        self.windows.lock().push_back(window);
    }

    /// Queue a window that is already behind the current height
    pub fn push_expired_window(&self) -> ValidityWindow {
        let height = self.height.load(Ordering::SeqCst);
        let window = ValidityWindow::new(Hash::new_unique(), height.saturating_sub(1));
        self.push_window(window);
        window
    }

    /// Queue the behaviour for the next submission
    pub fn push_send(&self, behavior: SendBehavior) {
        self.sends.lock().push_back(behavior);
    }

    /// Behaviour once the queue is empty
    pub fn set_default_send(&self, behavior: SendBehavior) {
        *self.default_send.lock() = behavior;
    }

    pub fn set_status(
        &self,
        signature: Signature,
        err: Option<TransactionError>,
        confirmation: ConfirmationStrength,
    ) {
        self.statuses.lock().insert(
            signature,
            SignatureState {
                slot: self.height.load(Ordering::SeqCst),
                err,
                confirmation: Some(confirmation),
            },
        );
    }

    /// Make the next `n` status queries fail with a transport error
    pub fn fail_status_queries(&self, n: u32) {
        self.failing_status_queries.store(n, Ordering::SeqCst);
    }

    pub fn add_account(&self, address: Pubkey) {
        self.accounts.lock().insert(address);
    }

    pub fn has_account(&self, address: &Pubkey) -> bool {
        self.accounts.lock().contains(address)
    }

    pub fn windows_fetched(&self) -> usize {
        self.windows_fetched.load(Ordering::SeqCst)
    }

    pub fn send_calls(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    pub fn account_queries(&self) -> usize {
        self.account_queries.load(Ordering::SeqCst)
    }

    /// Every transaction handed to `send_transaction`, in order
    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().clone()
    }

    pub fn sent_signatures(&self) -> Vec<Signature> {
        self.sent
            .lock()
            .iter()
            .filter_map(|tx| tx.signatures.first().copied())
            .collect()
    }

    /// Apply the side effects of a landed transaction: create the
    /// associated token accounts its instructions create
    fn apply_landed(&self, tx: &VersionedTransaction) {
        let keys = tx.message.static_account_keys();
        let mut accounts = self.accounts.lock();
        for ix in tx.message.instructions() {
            let program = keys.get(ix.program_id_index as usize);
            if program != Some(&spl_associated_token_account::id()) {
                continue;
            }
            if let Some(address) = ix.accounts.get(1).and_then(|i| keys.get(*i as usize)) {
                accounts.insert(*address);
            }
        }
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn latest_validity_window(
        &self,
        _strength: ConfirmationStrength,
    ) -> Result<ValidityWindow, RpcManagerError> {
        self.windows_fetched.fetch_add(1, Ordering::SeqCst);
        let scripted = self.windows.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| {
            let height = self.height.load(Ordering::SeqCst);
            ValidityWindow::new(Hash::new_unique(), height + DEFAULT_WINDOW_SPAN)
        }))
    }

    async fn block_height(&self, _strength: ConfirmationStrength) -> Result<u64, RpcManagerError> {
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        _options: SendOptions,
    ) -> Result<Signature, RpcManagerError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push(tx.clone());

        let signature = tx.signatures.first().copied().ok_or_else(|| {
            RpcManagerError::Internal("transaction without signatures".to_string())
        })?;

        let behavior = self
            .sends
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default_send.lock().clone());

        match behavior {
            SendBehavior::Fail(err) => Err(err),
            _ if self.statuses.lock().contains_key(&signature) => Err(RpcManagerError::AlreadyProcessed {
                endpoint: MOCK_ENDPOINT.to_string(),
            }),
            SendBehavior::Drop => Ok(signature),
            SendBehavior::Land { err, confirmation } => {
                if err.is_none() {
                    self.apply_landed(tx);
                }
                self.set_status(signature, err, confirmation);
                Ok(signature)
            }
        }
    }

    async fn signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureState>>, RpcManagerError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_status_queries.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_status_queries.store(failing - 1, Ordering::SeqCst);
            return Err(RpcManagerError::Transport {
                endpoint: MOCK_ENDPOINT.to_string(),
                message: "connection reset".to_string(),
            });
        }

        let statuses = self.statuses.lock();
        Ok(signatures.iter().map(|s| statuses.get(s).cloned()).collect())
    }

    async fn account_exists(
        &self,
        address: &Pubkey,
        _strength: ConfirmationStrength,
    ) -> Result<bool, RpcManagerError> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.lock().contains(address))
    }
}

/// In-memory signer that can be told to decline
pub struct MockSigner {
    keypair: Keypair,
    declines: bool,
    signed: AtomicUsize,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSigner {
    pub fn new() -> Self {
        Self {
            keypair: Keypair::new(),
            declines: false,
            signed: AtomicUsize::new(0),
        }
    }

    /// Signer whose holder refuses every request
    pub fn declining() -> Self {
        Self {
            declines: true,
            ..Self::new()
        }
    }

    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningProvider for MockSigner {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        if self.declines {
            return Err(SignerError::Declined(self.keypair.pubkey()));
        }
        self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(self.keypair.sign_message(message))
    }
}
