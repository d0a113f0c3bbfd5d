//! Confirmation awaiter
//!
//! Polls the signature status on a capped geometric schedule and races the
//! poll loop against the per-attempt timer. Whichever finishes first decides
//! the outcome; the loser is dropped, so no timer outlives the attempt.

use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::backoff::PollSchedule;
use super::output::Outcome;
use crate::metrics::{metrics, Timer};
use crate::rpc_manager::LedgerRpc;
use crate::types::{ConfirmationStrength, SignatureState, ValidityWindow};

/// Strength used to read block height for expiry.
///
/// Once the finalized height passes the window, no fork can still include
/// the transaction.
const EXPIRY_HEIGHT_STRENGTH: ConfirmationStrength = ConfirmationStrength::Finalized;

pub struct ConfirmationAwaiter {
    ledger: Arc<dyn LedgerRpc>,
    strength: ConfirmationStrength,
    schedule: PollSchedule,
}

impl ConfirmationAwaiter {
    pub fn new(ledger: Arc<dyn LedgerRpc>, strength: ConfirmationStrength, schedule: PollSchedule) -> Self {
        Self {
            ledger,
            strength,
            schedule,
        }
    }

    /// Wait for a definitive status of `signature`, at most `timeout`.
    ///
    /// Returns `Confirmed`, `FailedOnChain`, `Expired` or `TimedOut`.
    #[instrument(skip(self, window), fields(strength = %self.strength))]
    pub async fn await_outcome(
        &self,
        signature: Signature,
        window: &ValidityWindow,
        timeout: Duration,
    ) -> Outcome {
        let timer = Timer::new();

        let outcome = tokio::select! {
            outcome = self.poll_until_settled(signature, window) => outcome,
            _ = tokio::time::sleep(timeout) => {
                debug!(%signature, timeout_ms = timeout.as_millis() as u64, "Confirmation timer elapsed");
                Outcome::TimedOut { signature: Some(signature) }
            }
        };

        if outcome.is_authoritative() {
            timer.observe_duration(&metrics().confirmation_latency);
        }
        outcome
    }

    /// One status read; `Some` only for a definitive answer
    pub async fn check(&self, signature: Signature) -> Option<Outcome> {
        match self.ledger.signature_statuses(&[signature]).await {
            Ok(statuses) => statuses
                .into_iter()
                .next()
                .flatten()
                .filter(|state| state.satisfies(self.strength))
                .map(|state| settled(signature, state)),
            Err(e) => {
                warn!(%signature, error = %e, "Signature status query failed");
                None
            }
        }
    }

    async fn poll_until_settled(&self, signature: Signature, window: &ValidityWindow) -> Outcome {
        let mut polls: u32 = 0;
        loop {
            if let Some(outcome) = self.check(signature).await {
                return outcome;
            }

            match self.ledger.block_height(EXPIRY_HEIGHT_STRENGTH).await {
                Ok(height) if window.is_expired_at(height) => {
                    debug!(%signature, height, window = %window, "Validity window passed");
                    return self.final_check(signature).await;
                }
                Ok(_) => {}
                Err(e) => warn!(%signature, error = %e, "Block height query failed"),
            }

            tokio::time::sleep(self.schedule.delay(polls)).await;
            polls = polls.saturating_add(1);
        }
    }

    /// Last look after expiry: anything recorded by now is final
    async fn final_check(&self, signature: Signature) -> Outcome {
        match self.ledger.signature_statuses(&[signature]).await {
            Ok(statuses) => match statuses.into_iter().next().flatten() {
                Some(state) => settled(signature, state),
                None => Outcome::Expired {
                    signature: Some(signature),
                },
            },
            Err(e) => {
                warn!(%signature, error = %e, "Status query after expiry failed");
                Outcome::Expired {
                    signature: Some(signature),
                }
            }
        }
    }
}

fn settled(signature: Signature, state: SignatureState) -> Outcome {
    match state.err {
        None => Outcome::Confirmed(signature),
        Some(error) => Outcome::FailedOnChain { signature, error },
    }
}
