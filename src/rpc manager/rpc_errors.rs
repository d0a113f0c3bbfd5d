use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// Raw failure from a ledger RPC call, before classification
#[derive(Debug, Clone, Error)]
pub enum RpcManagerError {
    /// Transport-level errors (network, connection)
    #[error("Transport error: {message} (endpoint: {endpoint})")]
    Transport {
        endpoint: String,
        message: String,
    },

    /// Request did not finish within the configured timeout
    #[error("Timeout after {timeout_ms}ms (endpoint: {endpoint})")]
    Timeout {
        endpoint: String,
        timeout_ms: u64,
    },

    /// RPC response errors (from the RPC server)
    #[error("RPC response error: {message} (endpoint: {endpoint}, code: {code:?})")]
    RpcResponse {
        endpoint: String,
        message: String,
        code: Option<i64>,
    },

    /// Rate limit exceeded, either locally or reported by the node
    #[error("Rate limit exceeded (endpoint: {endpoint})")]
    RateLimitExceeded {
        endpoint: String,
    },

    #[error("Blockhash not found (endpoint: {endpoint})")]
    BlockhashNotFound {
        endpoint: String,
    },

    #[error("Transaction expired (endpoint: {endpoint})")]
    TransactionExpired {
        endpoint: String,
    },

    #[error("Account not found: {account} (endpoint: {endpoint})")]
    AccountNotFound {
        account: String,
        endpoint: String,
    },

    #[error("Insufficient funds (endpoint: {endpoint})")]
    InsufficientFunds {
        endpoint: String,
    },

    /// The identical transaction already landed
    #[error("Transaction already processed (endpoint: {endpoint})")]
    AlreadyProcessed {
        endpoint: String,
    },

    /// Preflight simulation rejected the transaction with a typed error
    #[error("Preflight failure: {error} (endpoint: {endpoint})")]
    PreflightFailure {
        endpoint: String,
        error: TransactionError,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcManagerError {
    /// Whether the failure is a property of the network path rather than the request
    pub fn is_transient(&self) -> bool {
        match self {
            RpcManagerError::Transport { .. } => true,
            RpcManagerError::Timeout { .. } => true,
            RpcManagerError::RateLimitExceeded { .. } => true,
            RpcManagerError::BlockhashNotFound { .. } => true,
            RpcManagerError::TransactionExpired { .. } => true,

            RpcManagerError::AccountNotFound { .. } => false,
            RpcManagerError::InsufficientFunds { .. } => false,
            RpcManagerError::AlreadyProcessed { .. } => false,
            RpcManagerError::PreflightFailure { .. } => false,
            RpcManagerError::Configuration(_) => false,
            RpcManagerError::Internal(_) => false,

            // Retry on server errors (5xx)
            RpcManagerError::RpcResponse { code, .. } => {
                matches!(code, Some(c) if (500..600).contains(c))
            }
        }
    }

    /// Get the endpoint associated with this error, if any
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RpcManagerError::Transport { endpoint, .. } => Some(endpoint),
            RpcManagerError::Timeout { endpoint, .. } => Some(endpoint),
            RpcManagerError::RpcResponse { endpoint, .. } => Some(endpoint),
            RpcManagerError::RateLimitExceeded { endpoint } => Some(endpoint),
            RpcManagerError::BlockhashNotFound { endpoint } => Some(endpoint),
            RpcManagerError::TransactionExpired { endpoint } => Some(endpoint),
            RpcManagerError::AccountNotFound { endpoint, .. } => Some(endpoint),
            RpcManagerError::InsufficientFunds { endpoint } => Some(endpoint),
            RpcManagerError::AlreadyProcessed { endpoint } => Some(endpoint),
            RpcManagerError::PreflightFailure { endpoint, .. } => Some(endpoint),
            RpcManagerError::Configuration(_) | RpcManagerError::Internal(_) => None,
        }
    }

    /// Map a typed transaction error returned by preflight or by `sendTransaction`
    pub fn from_transaction_error(error: TransactionError, endpoint: &str) -> Self {
        let endpoint = endpoint.to_string();
        match error {
            TransactionError::BlockhashNotFound => RpcManagerError::BlockhashNotFound { endpoint },
            TransactionError::AlreadyProcessed => RpcManagerError::AlreadyProcessed { endpoint },
            TransactionError::InsufficientFundsForFee
            | TransactionError::InsufficientFundsForRent { .. } => {
                RpcManagerError::InsufficientFunds { endpoint }
            }
            TransactionError::AccountNotFound => RpcManagerError::AccountNotFound {
                account: "fee payer".to_string(),
                endpoint,
            },
            other => RpcManagerError::PreflightFailure {
                endpoint,
                error: other,
            },
        }
    }

    /// Create from ClientError with context; `timeout_ms` is the request timeout in force
    pub fn from_client_error(err: ClientError, endpoint: &str, timeout_ms: u64) -> Self {
        if let Some(tx_error) = err.get_transaction_error() {
            return Self::from_transaction_error(tx_error, endpoint);
        }

        if let ClientErrorKind::Reqwest(ref reqwest_err) = *err.kind() {
            if reqwest_err.is_timeout() {
                return RpcManagerError::Timeout {
                    endpoint: endpoint.to_string(),
                    timeout_ms,
                };
            }
            if reqwest_err.is_connect() {
                return RpcManagerError::Transport {
                    endpoint: endpoint.to_string(),
                    message: reqwest_err.to_string(),
                };
            }
        }

        Self::from_message(&err.to_string(), endpoint, timeout_ms)
    }

    /// Classify based on error message
    pub fn from_message(message: &str, endpoint: &str, timeout_ms: u64) -> Self {
        let err_str = message.to_lowercase();
        let endpoint = endpoint.to_string();

        if err_str.contains("blockhash not found") {
            RpcManagerError::BlockhashNotFound { endpoint }
        } else if err_str.contains("transaction expired")
            || err_str.contains("block height exceeded")
        {
            RpcManagerError::TransactionExpired { endpoint }
        } else if err_str.contains("already been processed")
            || err_str.contains("already processed")
        {
            RpcManagerError::AlreadyProcessed { endpoint }
        } else if err_str.contains("account not found")
            || err_str.contains("could not find account")
        {
            RpcManagerError::AccountNotFound {
                account: "unknown".to_string(),
                endpoint,
            }
        } else if err_str.contains("insufficient funds")
            || err_str.contains("insufficient lamports")
        {
            RpcManagerError::InsufficientFunds { endpoint }
        } else if err_str.contains("rate limit")
            || err_str.contains("too many requests")
            || err_str.contains("429")
        {
            RpcManagerError::RateLimitExceeded { endpoint }
        } else if err_str.contains("timeout") || err_str.contains("timed out") {
            RpcManagerError::Timeout { endpoint, timeout_ms }
        } else if err_str.contains("connection refused")
            || err_str.contains("error sending request")
            || err_str.contains("dns error")
        {
            RpcManagerError::Transport {
                endpoint,
                message: message.to_string(),
            }
        } else {
            // Extract error code if available
            let code = err_str
                .split("code:")
                .nth(1)
                .and_then(|s| s.split_whitespace().next())
                .and_then(|s| s.trim_end_matches(',').parse::<i64>().ok());

            RpcManagerError::RpcResponse {
                endpoint,
                message: message.to_string(),
                code,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_transient() {
        assert!(RpcManagerError::Transport {
            endpoint: "test".to_string(),
            message: "connection failed".to_string(),
        }
        .is_transient());

        assert!(RpcManagerError::Timeout {
            endpoint: "test".to_string(),
            timeout_ms: 5000,
        }
        .is_transient());

        assert!(!RpcManagerError::InsufficientFunds {
            endpoint: "test".to_string(),
        }
        .is_transient());
        assert!(!RpcManagerError::AlreadyProcessed {
            endpoint: "test".to_string(),
        }
        .is_transient());
    }

    #[test]
    fn test_server_error_codes() {
        let server = RpcManagerError::RpcResponse {
            endpoint: "test".to_string(),
            message: "bad gateway".to_string(),
            code: Some(502),
        };
        assert!(server.is_transient());

        let client = RpcManagerError::RpcResponse {
            endpoint: "test".to_string(),
            message: "invalid params".to_string(),
            code: Some(-32602),
        };
        assert!(!client.is_transient());
    }

    #[test]
    fn test_error_endpoint() {
        let err = RpcManagerError::Timeout {
            endpoint: "https://test.com".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.endpoint(), Some("https://test.com"));

        let internal = RpcManagerError::Internal("test".to_string());
        assert_eq!(internal.endpoint(), None);
    }

    #[test]
    fn test_from_message_patterns() {
        let ep = "http://localhost:8899";
        assert!(matches!(
            RpcManagerError::from_message("Blockhash not found", ep, 30_000),
            RpcManagerError::BlockhashNotFound { .. }
        ));
        assert!(matches!(
            RpcManagerError::from_message(
                "Transaction simulation failed: This transaction has already been processed",
                ep,
                30_000
            ),
            RpcManagerError::AlreadyProcessed { .. }
        ));
        assert!(matches!(
            RpcManagerError::from_message("HTTP status client error (429 Too Many Requests)", ep, 30_000),
            RpcManagerError::RateLimitExceeded { .. }
        ));
        assert!(matches!(
            RpcManagerError::from_message("Attempt to debit an account but found no record of a prior credit. insufficient funds", ep, 30_000),
            RpcManagerError::InsufficientFunds { .. }
        ));
    }

    #[test]
    fn test_timeout_reports_configured_limit() {
        let err = RpcManagerError::from_message("operation timed out", "ep", 12_000);
        assert!(matches!(err, RpcManagerError::Timeout { timeout_ms: 12_000, .. }));
        assert!(err.to_string().contains("12000ms"));

        let client_err = ClientError::from(ClientErrorKind::Custom("request timed out".to_string()));
        assert!(matches!(
            RpcManagerError::from_client_error(client_err, "ep", 7_000),
            RpcManagerError::Timeout { timeout_ms: 7_000, .. }
        ));
    }

    #[test]
    fn test_from_message_extracts_code() {
        let err = RpcManagerError::from_message("server said code: 503 unavailable", "ep", 30_000);
        match err {
            RpcManagerError::RpcResponse { code, .. } => assert_eq!(code, Some(503)),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_from_transaction_error() {
        assert!(matches!(
            RpcManagerError::from_transaction_error(TransactionError::AlreadyProcessed, "ep"),
            RpcManagerError::AlreadyProcessed { .. }
        ));
        assert!(matches!(
            RpcManagerError::from_transaction_error(TransactionError::InsufficientFundsForFee, "ep"),
            RpcManagerError::InsufficientFunds { .. }
        ));
        assert!(matches!(
            RpcManagerError::from_transaction_error(TransactionError::AccountInUse, "ep"),
            RpcManagerError::PreflightFailure { .. }
        ));
    }
}
