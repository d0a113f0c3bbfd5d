//! Structured logging of the request lifecycle

use solana_sdk::signature::Signature;
use std::time::Duration;

use crate::observability::CorrelationId;
use crate::submission::{AttemptRecord, Outcome, TerminalFailure};
use crate::types::ValidityWindow;

/// Structured logger for attempt lifecycle events of one request
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    correlation_id: CorrelationId,
}

impl StructuredLogger {
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self { correlation_id }
    }

    pub fn log_request_started(&self, instructions: usize, max_attempts: u32) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            instructions,
            max_attempts,
            "Submitting transaction request"
        );
    }

    pub fn log_attempt_started(&self, attempt: u32, max_attempts: u32) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            attempt,
            max_attempts,
            "Attempt started"
        );
    }

    pub fn log_window_acquired(&self, attempt: u32, window: &ValidityWindow) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            attempt,
            blockhash = %window.blockhash,
            last_valid_block_height = window.last_valid_block_height,
            "Validity window acquired"
        );
    }

    pub fn log_submitted(&self, attempt: u32, signature: &Signature) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            attempt,
            signature = %signature,
            "Transaction submitted"
        );
    }

    pub fn log_attempt_finished(&self, record: &AttemptRecord) {
        let cause = record.cause.as_ref().map(|c| c.category()).unwrap_or("none");
        let signature = record.signature.map(|s| s.to_string()).unwrap_or_default();
        if record.outcome.is_authoritative() {
            tracing::debug!(
                correlation_id = %self.correlation_id,
                attempt = record.number,
                outcome = record.outcome.label(),
                signature = %signature,
                "Attempt settled"
            );
        } else {
            tracing::warn!(
                correlation_id = %self.correlation_id,
                attempt = record.number,
                outcome = record.outcome.label(),
                cause,
                signature = %signature,
                "Attempt did not confirm"
            );
        }
    }

    pub fn log_backoff(&self, attempt: u32, delay: Duration) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Backing off before next attempt"
        );
    }

    pub fn log_prior_landed(&self, signature: &Signature) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            signature = %signature,
            "Earlier attempt landed, not resubmitting"
        );
    }

    pub fn log_success(&self, outcome: &Outcome, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            outcome = outcome.label(),
            signature = ?outcome.signature(),
            latency_ms,
            "Transaction request settled"
        );
    }

    pub fn log_failure(&self, failure: &TerminalFailure, latency_ms: u64) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            cause = failure.cause.category(),
            error = %failure.cause,
            signature = ?failure.signature,
            attempts = failure.attempts,
            latency_ms,
            "Transaction request failed"
        );
    }
}
