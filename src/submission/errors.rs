//! Failure taxonomy for transaction submission
//!
//! Every raw failure is mapped onto a [`Cause`]. Retryable causes are
//! absorbed inside the engine; only terminal ones cross the engine boundary,
//! wrapped in a [`TerminalFailure`] that keeps the last signature observed.

use solana_sdk::{pubkey::Pubkey, signature::Signature};
use thiserror::Error;

/// Closed set of reasons an attempt or a request can end
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Cause {
    /// Validity window lapsed or the recency token was unknown to the node
    #[error("validity window expired")]
    ExpiredWindow,

    /// Confirmation not observed before the per-attempt timeout
    #[error("confirmation not observed within timeout")]
    ConfirmationTimeout,

    /// A required account does not exist and cannot be created automatically
    #[error("missing dependency: account {account} does not exist")]
    MissingDependency { account: Pubkey },

    /// Not enough balance to pay fees or transfer the value
    #[error("insufficient funds for fee or value")]
    InsufficientResources,

    #[error("user declined to sign")]
    UserDeclined,

    /// The identical transaction already landed
    #[error("transaction already processed")]
    AlreadyProcessed,

    /// A creation step raced with another creator of the same account
    #[error("dependency already exists")]
    DependencyAlreadyExists,

    /// The transaction landed but its execution failed
    #[error("failed on-chain: {0}")]
    OnChainFailure(String),

    /// Client-side validation rejected the request before any network call
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unclassified failure: {0}")]
    Unclassified(String),

    /// Every attempt resolved retryably; carries the last attempt's cause
    #[error("retries exhausted after {attempts} attempts (last: {last})")]
    RetriesExhausted { attempts: u32, last: Box<Cause> },
}

impl Cause {
    /// Benign causes are resolved locally as success
    pub fn is_benign(&self) -> bool {
        matches!(self, Cause::AlreadyProcessed | Cause::DependencyAlreadyExists)
    }

    /// Get the cause category for metrics and logs
    pub fn category(&self) -> &'static str {
        match self {
            Cause::ExpiredWindow => "expired_window",
            Cause::ConfirmationTimeout => "timeout",
            Cause::MissingDependency { .. } => "missing_dependency",
            Cause::InsufficientResources => "insufficient_resources",
            Cause::UserDeclined => "user_declined",
            Cause::AlreadyProcessed => "already_processed",
            Cause::DependencyAlreadyExists => "dependency_exists",
            Cause::OnChainFailure(_) => "on_chain",
            Cause::InvalidRequest(_) => "invalid_request",
            Cause::Unclassified(_) => "unclassified",
            Cause::RetriesExhausted { .. } => "retries_exhausted",
        }
    }

    /// The innermost cause, looking through `RetriesExhausted`
    pub fn root(&self) -> &Cause {
        match self {
            Cause::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }
}

/// Final failure of a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause}")]
pub struct TerminalFailure {
    pub cause: Cause,
    /// Last signature actually submitted, if any submission happened
    pub signature: Option<Signature>,
    /// Number of attempts started
    pub attempts: u32,
}

impl TerminalFailure {
    pub fn new(cause: Cause, signature: Option<Signature>, attempts: u32) -> Self {
        Self {
            cause,
            signature,
            attempts,
        }
    }

    /// True when a submitted transaction may still land and should be looked up later.
    ///
    /// Any terminal cause that follows a real submission qualifies, except
    /// expiry: the last window outlives every earlier one, so once it lapsed
    /// with no status recorded nothing submitted can land.
    pub fn may_have_landed(&self) -> bool {
        self.signature.is_some() && !matches!(self.cause.root(), Cause::ExpiredWindow)
    }

    /// Human-readable summary suitable for an end user
    pub fn summary(&self) -> String {
        let root = self.cause.root();
        match self.signature {
            Some(sig) if matches!(root, Cause::ConfirmationTimeout | Cause::Unclassified(_)) => {
                format!("could not confirm in time, check signature {sig}")
            }
            Some(sig) if self.may_have_landed() => {
                format!("{}; an earlier attempt may still land, check signature {sig}", describe(root))
            }
            _ => describe(root),
        }
    }
}

fn describe(cause: &Cause) -> String {
    match cause {
        Cause::UserDeclined => "declined".to_string(),
        Cause::InsufficientResources => "insufficient resources".to_string(),
        Cause::OnChainFailure(reason) => format!("failed on-chain ({reason})"),
        Cause::MissingDependency { account } => format!("required account {account} does not exist"),
        other => format!("failed: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause() {
        let cause = Cause::RetriesExhausted {
            attempts: 3,
            last: Box::new(Cause::ExpiredWindow),
        };
        assert_eq!(cause.root(), &Cause::ExpiredWindow);
        assert_eq!(cause.category(), "retries_exhausted");
    }

    #[test]
    fn test_benign_causes() {
        assert!(Cause::AlreadyProcessed.is_benign());
        assert!(Cause::DependencyAlreadyExists.is_benign());
        assert!(!Cause::UserDeclined.is_benign());
    }

    #[test]
    fn test_summary_timeout_carries_signature() {
        let sig = Signature::from([7u8; 64]);
        let failure = TerminalFailure::new(
            Cause::RetriesExhausted {
                attempts: 2,
                last: Box::new(Cause::ConfirmationTimeout),
            },
            Some(sig),
            2,
        );
        assert!(failure.may_have_landed());
        assert!(failure.summary().contains(&sig.to_string()));
    }

    #[test]
    fn test_summary_declined() {
        let failure = TerminalFailure::new(Cause::UserDeclined, None, 1);
        assert_eq!(failure.summary(), "declined");
        assert!(!failure.may_have_landed());
    }

    #[test]
    fn test_rejection_after_submission_may_have_landed() {
        let sig = Signature::from([3u8; 64]);
        let failure = TerminalFailure::new(Cause::InsufficientResources, Some(sig), 2);
        assert!(failure.may_have_landed());
        let summary = failure.summary();
        assert!(summary.starts_with("insufficient resources"));
        assert!(summary.contains(&sig.to_string()));
    }

    #[test]
    fn test_expiry_never_may_have_landed() {
        let failure = TerminalFailure::new(
            Cause::RetriesExhausted {
                attempts: 3,
                last: Box::new(Cause::ExpiredWindow),
            },
            Some(Signature::from([5u8; 64])),
            3,
        );
        assert!(!failure.may_have_landed());
        assert_eq!(failure.summary(), "failed: validity window expired");
    }

    #[test]
    fn test_display() {
        let failure = TerminalFailure::new(Cause::InsufficientResources, None, 1);
        assert_eq!(failure.to_string(), "insufficient funds for fee or value");
    }
}
