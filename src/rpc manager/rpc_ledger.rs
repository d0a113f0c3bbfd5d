//! `LedgerRpc` over pooled nonblocking `RpcClient` connections
//!
//! Endpoints are rotated round-robin, each call is throttled by a
//! per-endpoint token bucket and bounded by the request timeout.
use async_trait::async_trait;
use dashmap::DashMap;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use solana_client::{client_error::ClientError, nonblocking::rpc_client::RpcClient};
use solana_rpc_client_api::config::RpcSendTransactionConfig;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use solana_transaction_status::UiTransactionEncoding;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::{ConnectionPool, LedgerRpc, PoolStats, RpcManagerError, SendOptions};
use crate::config::RpcConfig;
use crate::metrics::metrics;
use crate::types::{ConfirmationStrength, SignatureState, ValidityWindow};

/// Ledger access backed by a [`ConnectionPool`] of RPC clients
pub struct RpcLedger {
    endpoints: Vec<String>,
    pool: ConnectionPool<RpcClient>,
    current_index: AtomicU64,
    request_timeout: Duration,
    limiters: DashMap<String, Arc<DefaultDirectRateLimiter>>,
    quota: Option<Quota>,
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("endpoints", &self.endpoints)
            .field("pool", &self.pool)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl RpcLedger {
    /// Build from configuration; no connection is opened until first use
    pub fn new(config: &RpcConfig) -> Result<Self, RpcManagerError> {
        if config.endpoints.is_empty() {
            return Err(RpcManagerError::Configuration(
                "at least one RPC endpoint is required".to_string(),
            ));
        }

        let request_timeout = Duration::from_secs(config.timeout_secs.max(1));
        let pool = ConnectionPool::new(config.pool_size, move |url: &str| {
            RpcClient::new_with_timeout(url.to_string(), request_timeout)
        });

        Ok(Self {
            endpoints: config.endpoints.clone(),
            pool,
            current_index: AtomicU64::new(0),
            request_timeout,
            limiters: DashMap::new(),
            quota: NonZeroU32::new(config.rate_limit_rps).map(Quota::per_second),
        })
    }

    /// Contact every endpoint once in the background.
    ///
    /// Callers are never blocked and warm-up failures are only logged; a dead
    /// endpoint surfaces later as per-request timeouts.
    pub fn spawn_warmup(self: &Arc<Self>) {
        for endpoint in self.endpoints.clone() {
            let ledger = Arc::clone(self);
            tokio::spawn(async move {
                let client = ledger.pool.acquire(&endpoint);
                let check = async {
                    let version = client.get_version().await?;
                    let slot = client.get_slot().await?;
                    Ok::<_, ClientError>((version.solana_core, slot))
                };
                match tokio::time::timeout(ledger.request_timeout, check).await {
                    Ok(Ok((version, slot))) => {
                        info!(url = %endpoint, version = %version, slot, "Warm-up succeeded");
                    }
                    Ok(Err(e)) => {
                        warn!(url = %endpoint, error = %e, "Warm-up failed");
                    }
                    Err(_) => {
                        warn!(url = %endpoint, "Warm-up timed out");
                    }
                }
            });
        }
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn next_endpoint(&self) -> &str {
        let idx = self.current_index.fetch_add(1, Ordering::Relaxed) as usize % self.endpoints.len();
        &self.endpoints[idx]
    }

    async fn throttle(&self, endpoint: &str) {
        let Some(quota) = self.quota else {
            return;
        };
        let limiter = self
            .limiters
            .entry(endpoint.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::direct(quota)))
            .clone();
        if limiter.check().is_err() {
            debug!(url = %endpoint, "Rate limiter engaged, waiting for capacity");
            limiter.until_ready().await;
        }
    }

    /// Run one RPC call against the next endpoint with throttling and timeout
    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, RpcManagerError>
    where
        F: FnOnce(Arc<RpcClient>) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let endpoint = self.next_endpoint();
        self.throttle(endpoint).await;
        let client = self.pool.acquire(endpoint);

        let started = Instant::now();
        let result = tokio::time::timeout(self.request_timeout, f(client)).await;
        metrics().rpc_latency.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = RpcManagerError::from_client_error(e, endpoint, self.request_timeout.as_millis() as u64);
                debug!(url = %endpoint, operation, error = %err, "RPC call failed");
                Err(err)
            }
            Err(_) => {
                debug!(url = %endpoint, operation, "RPC call timed out");
                Err(RpcManagerError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout_ms: self.request_timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[async_trait]
impl LedgerRpc for RpcLedger {
    #[instrument(skip(self))]
    async fn latest_validity_window(
        &self,
        strength: ConfirmationStrength,
    ) -> Result<ValidityWindow, RpcManagerError> {
        let (blockhash, last_valid_block_height) = self
            .call("getLatestBlockhash", |client| async move {
                client
                    .get_latest_blockhash_with_commitment(strength.commitment())
                    .await
            })
            .await?;
        Ok(ValidityWindow::new(blockhash, last_valid_block_height))
    }

    async fn block_height(&self, strength: ConfirmationStrength) -> Result<u64, RpcManagerError> {
        self.call("getBlockHeight", |client| async move {
            client
                .get_block_height_with_commitment(strength.commitment())
                .await
        })
        .await
    }

    #[instrument(skip(self, tx), fields(signature = ?tx.signatures.first()))]
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        options: SendOptions,
    ) -> Result<Signature, RpcManagerError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.preflight_strength.commitment().commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        };
        let tx = tx.clone();
        self.call("sendTransaction", move |client| async move {
            client.send_transaction_with_config(&tx, config).await
        })
        .await
    }

    async fn signature_statuses(
        &self,
        signatures: &[Signature],
    ) -> Result<Vec<Option<SignatureState>>, RpcManagerError> {
        let signatures = signatures.to_vec();
        let statuses = self
            .call("getSignatureStatuses", move |client| async move {
                client.get_signature_statuses(&signatures).await
            })
            .await?
            .value;

        Ok(statuses
            .into_iter()
            .map(|status| {
                status.map(|s| SignatureState {
                    slot: s.slot,
                    err: s.err.map(Into::into),
                    confirmation: s.confirmation_status.map(ConfirmationStrength::from),
                })
            })
            .collect())
    }

    async fn account_exists(
        &self,
        address: &Pubkey,
        strength: ConfirmationStrength,
    ) -> Result<bool, RpcManagerError> {
        let address = *address;
        let account = self
            .call("getAccountInfo", move |client| async move {
                client
                    .get_account_with_commitment(&address, strength.commitment())
                    .await
            })
            .await?
            .value;
        Ok(account.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoints: Vec<&str>) -> RpcConfig {
        RpcConfig {
            endpoints: endpoints.into_iter().map(String::from).collect(),
            ..RpcConfig::default()
        }
    }

    #[test]
    fn test_requires_endpoint() {
        let err = RpcLedger::new(&config(vec![])).unwrap_err();
        assert!(matches!(err, RpcManagerError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_no_connections_before_use() {
        let ledger = RpcLedger::new(&config(vec!["http://localhost:8899"])).unwrap();
        assert_eq!(ledger.pool_stats().connections, 0);
    }

    #[test]
    fn test_endpoint_rotation() {
        let ledger = RpcLedger::new(&config(vec!["http://a", "http://b"])).unwrap();
        assert_eq!(ledger.next_endpoint(), "http://a");
        assert_eq!(ledger.next_endpoint(), "http://b");
        assert_eq!(ledger.next_endpoint(), "http://a");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_individually() {
        let mut cfg = config(vec!["http://127.0.0.1:1"]);
        cfg.timeout_secs = 1;
        let ledger = Arc::new(RpcLedger::new(&cfg).unwrap());
        ledger.spawn_warmup();

        let result = ledger.block_height(ConfirmationStrength::Confirmed).await;
        assert!(result.is_err());
        assert_eq!(ledger.pool_stats().connections, cfg.pool_size);
    }
}
