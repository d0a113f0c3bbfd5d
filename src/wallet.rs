//! Wallet management module
//!
//! Signing is exposed through the [`SigningProvider`] capability so the
//! engine never needs to know whether a key lives in memory, on disk, or
//! behind a prompt that the user can decline.

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

/// Failures raised while producing a signature
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    /// The key holder refused to sign
    #[error("Signing declined by {0}")]
    Declined(Pubkey),

    /// The provider cannot be reached (locked, disconnected)
    #[error("Signer unavailable: {0}")]
    Unavailable(String),

    #[error("Signing failed: {0}")]
    Failed(String),
}

/// Capability supplied by the caller for each required signer
#[async_trait]
pub trait SigningProvider: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Sign the serialized transaction message
    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError>;
}

/// Errors loading a wallet from disk
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Failed to read keypair file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid keypair: {0}")]
    Invalid(String),
}

/// Wallet manager for handling an in-process keypair
pub struct WalletManager {
    keypair: Arc<Keypair>,
}

impl WalletManager {
    /// Create a new wallet manager from a keypair file (JSON array or raw 64 bytes)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let keypair_bytes = Zeroizing::new(std::fs::read(path).map_err(|source| WalletError::Read {
            path: path.display().to_string(),
            source,
        })?);

        let secret: Zeroizing<Vec<u8>> = if keypair_bytes.len() == 64 {
            Zeroizing::new(keypair_bytes.to_vec())
        } else {
            let json: Vec<u8> = serde_json::from_slice(&keypair_bytes)
                .map_err(|e| WalletError::Invalid(format!("failed to parse keypair JSON: {e}")))?;
            Zeroizing::new(json)
        };

        Self::from_secret_bytes(&secret)
    }

    fn from_secret_bytes(bytes: &[u8]) -> Result<Self, WalletError> {
        if bytes.len() != 64 {
            return Err(WalletError::Invalid(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        if bytes.iter().all(|&b| b == 0) {
            return Err(WalletError::Invalid("all-zero key rejected".to_string()));
        }
        let keypair = Keypair::try_from(bytes).map_err(|e| WalletError::Invalid(e.to_string()))?;
        Ok(Self::from_keypair(keypair))
    }

    /// Create a new wallet manager from a keypair
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    /// Get the public key
    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

impl Clone for WalletManager {
    fn clone(&self) -> Self {
        Self {
            keypair: Arc::clone(&self.keypair),
        }
    }
}

impl std::fmt::Debug for WalletManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletManager")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

#[async_trait]
impl SigningProvider for WalletManager {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature, SignerError> {
        self.keypair
            .try_sign_message(message)
            .map_err(|e| SignerError::Failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_json_keypair() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let wallet = WalletManager::from_file(file.path()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_load_raw_keypair() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&keypair.to_bytes()).unwrap();

        let wallet = WalletManager::from_file(file.path()).unwrap();
        assert_eq!(wallet.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_reject_zero_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 64]).unwrap();

        let err = WalletManager::from_file(file.path()).unwrap_err();
        assert!(matches!(err, WalletError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = WalletManager::from_file("/nonexistent/id.json").unwrap_err();
        assert!(matches!(err, WalletError::Read { .. }));
    }

    #[tokio::test]
    async fn test_signature_verifies() {
        let wallet = WalletManager::from_keypair(Keypair::new());
        let message = b"transfer";
        let signature = wallet.sign_message(message).await.unwrap();
        assert!(signature.verify(wallet.pubkey().as_ref(), message));
    }
}
