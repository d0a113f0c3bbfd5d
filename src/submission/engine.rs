//! Submission engine
//!
//! Drives one [`TransactionRequest`] through its attempt sequence: fresh
//! validity window, sign, submit once, await confirmation, classify, and
//! either stop or back off and start the next attempt. Attempts are strictly
//! sequential; a new one starts only after the previous one resolved.

use solana_sdk::signature::Signature;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::attempt::AttemptRecord;
use super::backoff::PollSchedule;
use super::builder::sign_transaction;
use super::classifier::{classify, Classification, RawFailure};
use super::confirm::ConfirmationAwaiter;
use super::errors::{Cause, TerminalFailure};
use super::output::Outcome;
use super::progress::{ProgressEvent, ProgressObserver};
use super::request::{SubmitConfig, TransactionRequest};
use super::state::{AttemptMachine, Decision, Phase, TransitionError};
use crate::metrics::{metrics, Timer};
use crate::rpc_manager::{LedgerRpc, RpcManagerError, SendOptions};
use crate::structured_logging::StructuredLogger;
use crate::types::{ConfirmationStrength, ValidityWindow};

/// Windows are fetched at the most durable strength so a fork cannot
/// invalidate them before their nominal expiry.
const WINDOW_STRENGTH: ConfirmationStrength = ConfirmationStrength::Finalized;

enum AttemptResult {
    Confirmed(Signature),
    FailedOnChain {
        signature: Signature,
        error: solana_sdk::transaction::TransactionError,
    },
    Failed {
        classification: Classification,
        signature: Option<Signature>,
    },
}

struct AttemptReport {
    window: Option<ValidityWindow>,
    result: AttemptResult,
}

impl AttemptReport {
    fn failed(window: Option<ValidityWindow>, classification: Classification, signature: Option<Signature>) -> Self {
        Self {
            window,
            result: AttemptResult::Failed {
                classification,
                signature,
            },
        }
    }
}

/// What a status read of earlier signatures found
enum Sweep {
    /// An earlier attempt settled at the required strength
    Landed(Outcome),
    /// An earlier attempt is known to the ledger but not yet strong enough
    Pending(Signature, ValidityWindow),
    Clear,
}

/// Keeps the in-flight gauge honest when the caller abandons a request
struct InFlightGuard;

impl InFlightGuard {
    fn enter() -> Self {
        metrics().in_flight_requests.inc();
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        metrics().in_flight_requests.dec();
    }
}

/// Reliable submission of transaction requests over a [`LedgerRpc`]
pub struct SubmissionEngine {
    ledger: Arc<dyn LedgerRpc>,
    poll: PollSchedule,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl SubmissionEngine {
    pub fn new(ledger: Arc<dyn LedgerRpc>) -> Self {
        Self {
            ledger,
            poll: PollSchedule::default(),
            observer: None,
        }
    }

    pub fn with_poll_schedule(mut self, poll: PollSchedule) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Submit a request and drive it to a final result.
    ///
    /// `Ok` carries an authoritative outcome (`Confirmed` or `FailedOnChain`).
    /// Everything else is a [`TerminalFailure`] that keeps the last signature
    /// actually submitted, so the caller can look it up later.
    #[instrument(skip_all, fields(correlation_id = %request.correlation_id()))]
    pub async fn submit(&self, request: TransactionRequest) -> Result<Outcome, TerminalFailure> {
        let _in_flight = InFlightGuard::enter();
        let timer = Timer::new();
        metrics().requests_total.inc();

        let logger = StructuredLogger::new(request.correlation_id().clone());
        let result = self.drive(request, &logger).await;
        timer.observe_duration(&metrics().submit_latency);

        match &result {
            Ok(outcome) => {
                match outcome {
                    Outcome::Confirmed(_) => metrics().confirmed_total.inc(),
                    Outcome::FailedOnChain { .. } => metrics().failed_on_chain_total.inc(),
                    _ => {}
                }
                logger.log_success(outcome, timer.elapsed_ms());
            }
            Err(failure) => {
                metrics().record_terminal_failure(failure.cause.category());
                logger.log_failure(failure, timer.elapsed_ms());
            }
        }
        result
    }

    async fn drive(
        &self,
        mut request: TransactionRequest,
        logger: &StructuredLogger,
    ) -> Result<Outcome, TerminalFailure> {
        if let Err(cause) = request.validate() {
            return Err(TerminalFailure::new(cause, None, 0));
        }

        let config = request.config().clone();
        let mut machine = AttemptMachine::new(config.max_retries, config.backoff());
        let awaiter = ConfirmationAwaiter::new(Arc::clone(&self.ledger), config.commitment, self.poll);
        // Every signature the ledger may have seen, with the window it was signed under
        let mut submitted: Vec<(Signature, ValidityWindow)> = Vec::new();

        logger.log_request_started(request.instructions().len(), machine.max_attempts());

        loop {
            let attempt = machine
                .begin_attempt()
                .map_err(|e| internal_failure(e, &submitted, machine.attempt()))?;
            metrics().attempts_total.inc();
            logger.log_attempt_started(attempt, machine.max_attempts());
            self.notify(ProgressEvent::AttemptStarted {
                attempt,
                max_attempts: machine.max_attempts(),
            });

            let pending = match self.sweep(&submitted, config.commitment).await {
                Sweep::Landed(outcome) => {
                    if let Some(signature) = outcome.signature() {
                        logger.log_prior_landed(&signature);
                    }
                    return Ok(outcome);
                }
                Sweep::Pending(signature, window) => Some((signature, window)),
                Sweep::Clear => None,
            };

            let report = match pending {
                // Spend this attempt waiting on the earlier transaction instead of resubmitting
                Some((signature, window)) => {
                    self.rejoin(&awaiter, &mut machine, signature, window, &config)
                        .await
                }
                None => {
                    self.run_attempt(&request, &awaiter, &mut machine, &mut submitted, logger)
                        .await
                }
            }
            .map_err(|e| internal_failure(e, &submitted, attempt))?;
            let window = report.window;

            match report.result {
                AttemptResult::Confirmed(signature) => {
                    let outcome = Outcome::Confirmed(signature);
                    self.settle(&mut machine, Phase::Confirmed, &submitted)?;
                    self.finish_attempt(logger, AttemptRecord::settled(attempt, window, outcome.clone()));
                    return Ok(outcome);
                }

                AttemptResult::FailedOnChain { signature, error } => {
                    let classification = classify(&RawFailure::OnChain {
                        error: error.clone(),
                        creation_prefix: request.creation_prefix(),
                    });
                    let outcome = Outcome::FailedOnChain { signature, error };

                    if classification.cause() == &Cause::DependencyAlreadyExists
                        && self.can_drop_creations(&request, &machine)
                    {
                        // The landed transaction is final; never sweep it again
                        submitted.retain(|(s, _)| *s != signature);
                        self.finish_attempt(
                            logger,
                            AttemptRecord::retryable(attempt, window, Some(signature), Cause::DependencyAlreadyExists),
                        );
                        let stripped = request.strip_creations();
                        info!(stripped, %signature, "Dependency created concurrently, retrying without creation steps");
                        machine
                            .resolve_retryable(Cause::DependencyAlreadyExists)
                            .map_err(|e| internal_failure(e, &submitted, attempt))?;
                        continue;
                    }

                    self.settle(&mut machine, Phase::FailedOnChain, &submitted)?;
                    self.finish_attempt(logger, AttemptRecord::settled(attempt, window, outcome.clone()));
                    return Ok(outcome);
                }

                AttemptResult::Failed {
                    classification: Classification::Terminal(Cause::AlreadyProcessed),
                    signature: Some(signature),
                } => {
                    // The identical transaction landed earlier; it is this request's signature
                    let outcome = Outcome::Confirmed(signature);
                    machine
                        .transition(Phase::Confirming)
                        .and_then(|_| machine.transition(Phase::Confirmed))
                        .map_err(|e| internal_failure(e, &submitted, attempt))?;
                    self.finish_attempt(logger, AttemptRecord::settled(attempt, window, outcome.clone()));
                    return Ok(outcome);
                }

                AttemptResult::Failed {
                    classification: Classification::Terminal(Cause::DependencyAlreadyExists),
                    signature,
                } if self.can_drop_creations(&request, &machine) => {
                    self.finish_attempt(
                        logger,
                        AttemptRecord::retryable(attempt, window, signature, Cause::DependencyAlreadyExists),
                    );
                    let stripped = request.strip_creations();
                    info!(stripped, "Dependency already exists, retrying without creation steps");
                    machine
                        .resolve_retryable(Cause::DependencyAlreadyExists)
                        .map_err(|e| internal_failure(e, &submitted, attempt))?;
                    continue;
                }

                AttemptResult::Failed {
                    classification: Classification::Terminal(cause),
                    ..
                } => {
                    self.settle(&mut machine, Phase::Rejected, &submitted)?;
                    self.finish_attempt(
                        logger,
                        AttemptRecord::settled(attempt, window, Outcome::Rejected(cause.clone())),
                    );
                    let failure = TerminalFailure::new(cause, last_signature(&submitted), attempt);
                    return self.fail(failure, &submitted, config.commitment, logger).await;
                }

                AttemptResult::Failed {
                    classification: Classification::Retryable(cause),
                    signature,
                } => {
                    match cause {
                        Cause::ExpiredWindow => metrics().expired_total.inc(),
                        _ => metrics().timed_out_total.inc(),
                    }
                    self.finish_attempt(
                        logger,
                        AttemptRecord::retryable(attempt, window, signature, cause.clone()),
                    );

                    match machine
                        .resolve_retryable(cause)
                        .map_err(|e| internal_failure(e, &submitted, attempt))?
                    {
                        Decision::Retry { delay, .. } => {
                            logger.log_backoff(attempt, delay);
                            self.notify(ProgressEvent::BackingOff { attempt, delay });
                            tokio::time::sleep(delay).await;
                        }
                        Decision::Exhausted(cause) => {
                            let failure = TerminalFailure::new(cause, last_signature(&submitted), attempt);
                            return self.fail(failure, &submitted, config.commitment, logger).await;
                        }
                    }
                }
            }
        }
    }

    /// One attempt: window, sign, submit, confirm
    async fn run_attempt(
        &self,
        request: &TransactionRequest,
        awaiter: &ConfirmationAwaiter,
        machine: &mut AttemptMachine,
        submitted: &mut Vec<(Signature, ValidityWindow)>,
        logger: &StructuredLogger,
    ) -> Result<AttemptReport, TransitionError> {
        let attempt = machine.attempt();
        let config = request.config();

        let window = match self.ledger.latest_validity_window(WINDOW_STRENGTH).await {
            Ok(window) => window,
            Err(e) => return Ok(AttemptReport::failed(None, classify(&RawFailure::Rpc(e)), None)),
        };
        metrics().windows_fetched.inc();
        logger.log_window_acquired(attempt, &window);

        self.advance(machine, Phase::Signing)?;
        let tx = match sign_transaction(request, &window).await {
            Ok(tx) => tx,
            Err(raw) => return Ok(AttemptReport::failed(Some(window), classify(&raw), None)),
        };
        let Some(&expected) = tx.signatures.first() else {
            return Ok(AttemptReport::failed(
                Some(window),
                classify(&RawFailure::Invalid("transaction has no signatures".to_string())),
                None,
            ));
        };

        self.advance(machine, Phase::Submitted)?;
        let options = SendOptions {
            skip_preflight: config.skip_preflight,
            preflight_strength: config.commitment,
        };
        let signature = match self.ledger.send_transaction(&tx, options).await {
            Ok(signature) => signature,
            Err(e) => {
                let classification = classify_send_error(e, request.creation_prefix());
                // The node may have forwarded it before failing; keep it for the sweep
                if matches!(classification, Classification::Retryable(Cause::Unclassified(_))) {
                    submitted.push((expected, window));
                }
                return Ok(AttemptReport::failed(Some(window), classification, Some(expected)));
            }
        };
        if signature != expected {
            warn!(%signature, %expected, "Node returned an unexpected signature");
        }
        submitted.push((signature, window));
        logger.log_submitted(attempt, &signature);

        self.advance(machine, Phase::Confirming)?;
        let outcome = awaiter
            .await_outcome(signature, &window, config.per_attempt_timeout())
            .await;

        Ok(AttemptReport {
            window: Some(window),
            result: attempt_result(outcome, signature),
        })
    }

    /// Await an earlier attempt's transaction under the current attempt's timeout
    async fn rejoin(
        &self,
        awaiter: &ConfirmationAwaiter,
        machine: &mut AttemptMachine,
        signature: Signature,
        window: ValidityWindow,
        config: &SubmitConfig,
    ) -> Result<AttemptReport, TransitionError> {
        info!(%signature, "Earlier attempt seen below required strength, awaiting it instead of resubmitting");
        machine.rejoin_earlier()?;
        self.notify(ProgressEvent::PhaseChanged {
            attempt: machine.attempt(),
            phase: Phase::Confirming,
        });
        let outcome = awaiter
            .await_outcome(signature, &window, config.per_attempt_timeout())
            .await;

        Ok(AttemptReport {
            window: Some(window),
            result: attempt_result(outcome, signature),
        })
    }

    /// One status read of every earlier signature, never waiting.
    ///
    /// An earlier attempt that landed after its own confirmation timed out
    /// wins; submitting again would risk landing twice.
    async fn sweep(&self, submitted: &[(Signature, ValidityWindow)], strength: ConfirmationStrength) -> Sweep {
        if submitted.is_empty() {
            return Sweep::Clear;
        }
        let signatures: Vec<Signature> = submitted.iter().map(|(s, _)| *s).collect();
        let statuses = match self.ledger.signature_statuses(&signatures).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(error = %e, "Status sweep of earlier attempts failed");
                return Sweep::Clear;
            }
        };

        let mut pending = None;
        for ((signature, window), status) in submitted.iter().zip(statuses) {
            let Some(state) = status else {
                continue;
            };
            if state.satisfies(strength) {
                return Sweep::Landed(match state.err {
                    None => Outcome::Confirmed(*signature),
                    Some(error) => Outcome::FailedOnChain {
                        signature: *signature,
                        error,
                    },
                });
            }
            // Latest one wins: its window lasts longest
            pending = Some((*signature, *window));
        }
        match pending {
            Some((signature, window)) => Sweep::Pending(signature, window),
            None => Sweep::Clear,
        }
    }

    /// Last status read before reporting `failure`; an earlier attempt that
    /// landed in the meantime turns it into that attempt's outcome
    async fn fail(
        &self,
        failure: TerminalFailure,
        submitted: &[(Signature, ValidityWindow)],
        strength: ConfirmationStrength,
        logger: &StructuredLogger,
    ) -> Result<Outcome, TerminalFailure> {
        match self.sweep(submitted, strength).await {
            Sweep::Landed(outcome) => {
                if let Some(signature) = outcome.signature() {
                    logger.log_prior_landed(&signature);
                }
                Ok(outcome)
            }
            Sweep::Pending(..) | Sweep::Clear => Err(failure),
        }
    }

    fn can_drop_creations(&self, request: &TransactionRequest, machine: &AttemptMachine) -> bool {
        request.creation_prefix() > 0
            && request.creation_prefix() < request.instructions().len()
            && machine.attempt() < machine.max_attempts()
    }

    fn advance(&self, machine: &mut AttemptMachine, phase: Phase) -> Result<(), TransitionError> {
        machine.transition(phase)?;
        self.notify(ProgressEvent::PhaseChanged {
            attempt: machine.attempt(),
            phase,
        });
        Ok(())
    }

    fn settle(
        &self,
        machine: &mut AttemptMachine,
        phase: Phase,
        submitted: &[(Signature, ValidityWindow)],
    ) -> Result<(), TerminalFailure> {
        let attempt = machine.attempt();
        self.advance(machine, phase)
            .map_err(|e| internal_failure(e, submitted, attempt))
    }

    fn finish_attempt(&self, logger: &StructuredLogger, record: AttemptRecord) {
        logger.log_attempt_finished(&record);
        self.notify(ProgressEvent::AttemptFinished(record));
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }
}

/// Preflight failures carry the simulated execution error, which is
/// classified like an on-chain one so creation races are recognised.
fn classify_send_error(err: RpcManagerError, creation_prefix: usize) -> Classification {
    match err {
        RpcManagerError::PreflightFailure { error, .. } => classify(&RawFailure::OnChain {
            error,
            creation_prefix,
        }),
        other => classify(&RawFailure::Rpc(other)),
    }
}

fn attempt_result(outcome: Outcome, signature: Signature) -> AttemptResult {
    match outcome {
        Outcome::Confirmed(signature) => AttemptResult::Confirmed(signature),
        Outcome::FailedOnChain { signature, error } => AttemptResult::FailedOnChain { signature, error },
        Outcome::Expired { .. } => AttemptResult::Failed {
            classification: classify(&RawFailure::WindowExpired),
            signature: Some(signature),
        },
        Outcome::TimedOut { .. } | Outcome::Rejected(_) => AttemptResult::Failed {
            classification: classify(&RawFailure::ConfirmationTimeout),
            signature: Some(signature),
        },
    }
}

fn last_signature(submitted: &[(Signature, ValidityWindow)]) -> Option<Signature> {
    submitted.last().map(|(signature, _)| *signature)
}

fn internal_failure(
    err: TransitionError,
    submitted: &[(Signature, ValidityWindow)],
    attempts: u32,
) -> TerminalFailure {
    TerminalFailure::new(
        Cause::Unclassified(format!("internal state error: {err}")),
        last_signature(submitted),
        attempts,
    )
}
