//! Loading configuration and wallets from disk

use std::io::Write;

use reliable_tx::config::{Config, ConfigError};
use reliable_tx::rpc_manager::RpcLedger;
use reliable_tx::types::ConfirmationStrength;
use reliable_tx::wallet::WalletManager;
use solana_sdk::signature::{Keypair, Signer};

const SAMPLE: &str = r#"
[rpc]
endpoints = ["http://127.0.0.1:8899", "http://127.0.0.1:8900"]
pool_size = 4
rate_limit_rps = 0
warmup = false

[submit]
max_retries = 5
base_delay_ms = 250
max_delay_ms = 4000
commitment = "finalized"

[confirm]
base_ms = 500
growth = 2.0
max_ms = 5000
"#;

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SAMPLE.as_bytes()).unwrap();

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.rpc.endpoints.len(), 2);
    assert_eq!(config.rpc.pool_size, 4);
    assert_eq!(config.submit.max_retries, 5);
    assert_eq!(config.submit.commitment, ConfirmationStrength::Finalized);
    assert_eq!(config.submit.per_attempt_timeout_ms, 60_000);
    assert_eq!(config.confirm.max_ms, 5_000);
    assert!(config.monitoring.enable_metrics);
}

#[test]
fn test_missing_config_file() {
    let err = Config::from_file("/nonexistent/reliable-tx.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_malformed_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[submit]\nmax_retries = \"many\"\n").unwrap();

    let err = Config::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[tokio::test]
async fn test_ledger_from_loaded_config() {
    let config = Config::from_toml(SAMPLE).unwrap();
    let ledger = RpcLedger::new(&config.rpc).unwrap();

    let stats = ledger.pool_stats();
    assert_eq!(stats.endpoints, 0);
    assert_eq!(stats.connections, 0);
}

#[test]
fn test_wallet_from_configured_path() {
    let keypair = Keypair::new();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
    file.write_all(json.as_bytes()).unwrap();

    let mut config = Config::default();
    config.wallet.keypair_path = file.path().display().to_string();

    let wallet = WalletManager::from_file(config.wallet.resolved_keypair_path()).unwrap();
    assert_eq!(wallet.pubkey(), keypair.pubkey());
}
