//! Record of one attempt in a request's retry sequence

use solana_sdk::signature::Signature;

use super::errors::Cause;
use super::output::Outcome;
use crate::types::ValidityWindow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub number: u32,
    /// Window the attempt was signed under; `None` if fetching it failed
    pub window: Option<ValidityWindow>,
    /// Signature of the transaction this attempt sent
    pub signature: Option<Signature>,
    pub outcome: Outcome,
    /// Classifier cause when the attempt did not confirm
    pub cause: Option<Cause>,
}

impl AttemptRecord {
    /// Build the record for an attempt the classifier marked retryable
    pub fn retryable(
        number: u32,
        window: Option<ValidityWindow>,
        signature: Option<Signature>,
        cause: Cause,
    ) -> Self {
        let outcome = match cause {
            Cause::ExpiredWindow => Outcome::Expired { signature },
            _ => Outcome::TimedOut { signature },
        };
        Self {
            number,
            window,
            signature,
            outcome,
            cause: Some(cause),
        }
    }

    pub fn settled(number: u32, window: Option<ValidityWindow>, outcome: Outcome) -> Self {
        let cause = match &outcome {
            Outcome::Rejected(cause) => Some(cause.clone()),
            Outcome::FailedOnChain { error, .. } => Some(Cause::OnChainFailure(error.to_string())),
            _ => None,
        };
        Self {
            number,
            window,
            signature: outcome.signature(),
            outcome,
            cause,
        }
    }
}
