//! Bounds on retry delays and on the total time a request can take

use proptest::prelude::*;
use solana_sdk::{pubkey::Pubkey, system_instruction};
use std::sync::Arc;
use std::time::Duration;

use crate::submission::{
    AttemptMachine, Cause, Decision, RetryBackoff, SubmissionEngine, SubmitConfig, TransactionRequest,
};
use crate::test_utils::{MockLedger, MockSigner, SendBehavior};
use crate::wallet::SigningProvider;

proptest! {
    #[test]
    fn backoff_never_decreases_and_respects_cap(
        base in 1u64..10_000,
        extra in 0u64..100_000,
        attempts in 1u32..64,
    ) {
        let backoff = RetryBackoff::new(base, base + extra);
        let mut previous = Duration::ZERO;
        for attempt in 1..=attempts {
            let delay = backoff.delay_after(attempt);
            prop_assert!(delay >= previous);
            prop_assert!(delay <= Duration::from_millis(base + extra));
            previous = delay;
        }
    }

    #[test]
    fn total_delay_bounded_by_cap(
        base in 1u64..5_000,
        extra in 0u64..20_000,
        attempts in 1u32..20,
    ) {
        let max = base + extra;
        let backoff = RetryBackoff::new(base, max);
        let total = backoff.total_delay(attempts);
        prop_assert!(total <= Duration::from_millis(max * u64::from(attempts - 1)));
    }

    #[test]
    fn machine_starts_at_most_max_attempts(max in 1u32..12) {
        let mut machine = AttemptMachine::new(max, RetryBackoff::new(100, 1_000));
        let mut started = 0;
        loop {
            if machine.begin_attempt().is_err() {
                break;
            }
            started += 1;
            match machine.resolve_retryable(Cause::ConfirmationTimeout).unwrap() {
                Decision::Retry { next_attempt, .. } => prop_assert_eq!(next_attempt, started + 1),
                Decision::Exhausted(cause) => {
                    prop_assert_eq!(
                        cause,
                        Cause::RetriesExhausted {
                            attempts: max,
                            last: Box::new(Cause::ConfirmationTimeout),
                        }
                    );
                    break;
                }
            }
        }
        prop_assert_eq!(started, max);
    }
}

#[tokio::test(start_paused = true)]
async fn test_dropped_request_finishes_within_budget() {
    let ledger = Arc::new(MockLedger::new());
    ledger.set_default_send(SendBehavior::Drop);

    let engine = SubmissionEngine::new(ledger.clone());
    let payer = Arc::new(MockSigner::new());
    let config = SubmitConfig {
        max_retries: 4,
        base_delay_ms: 250,
        max_delay_ms: 1_000,
        per_attempt_timeout_ms: 3_000,
        ..SubmitConfig::default()
    };
    let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
    let request = TransactionRequest::new(vec![ix], payer.clone()).with_config(config.clone());

    let started = tokio::time::Instant::now();
    let failure = engine.submit(request).await.unwrap_err();
    let elapsed = started.elapsed();

    let budget = config.per_attempt_timeout() * config.max_retries
        + config.backoff().total_delay(config.max_retries);
    assert!(elapsed <= budget, "took {elapsed:?}, budget {budget:?}");
    assert_eq!(failure.attempts, 4);
    assert_eq!(ledger.send_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_single_attempt_never_backs_off() {
    let ledger = Arc::new(MockLedger::new());
    ledger.push_expired_window();
    ledger.set_default_send(SendBehavior::Drop);

    let engine = SubmissionEngine::new(ledger.clone());
    let payer = Arc::new(MockSigner::new());
    let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
    let request = TransactionRequest::new(vec![ix], payer.clone()).with_config(SubmitConfig {
        max_retries: 1,
        ..SubmitConfig::default()
    });

    let started = tokio::time::Instant::now();
    let failure = engine.submit(request).await.unwrap_err();
    assert!(started.elapsed() < Duration::from_millis(SubmitConfig::default().base_delay_ms));
    assert_eq!(failure.cause.root(), &Cause::ExpiredWindow);
    assert_eq!(ledger.windows_fetched(), 1);
}
