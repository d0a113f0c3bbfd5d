//! Attempt state machine
//!
//! Pure bookkeeping of where a request is in its retry sequence. The engine
//! drives it; nothing here performs I/O, so every transition is testable on
//! its own.
//!
//! ```text
//! Idle -> Preparing -> Signing -> Submitted -> Confirming
//!   Preparing -> Confirming (later attempts rejoining an earlier transaction)
//!   Confirming -> Confirmed | FailedOnChain
//!   any active phase -> Rejected
//!   any active phase -> Expired | TimedOut -> Preparing (attempts left)
//!                                          -> TerminalFailure
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::backoff::RetryBackoff;
use super::errors::Cause;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Idle,
    Preparing,
    Signing,
    Submitted,
    Confirming,
    Confirmed,
    FailedOnChain,
    Rejected,
    Expired,
    /// Status unknown; also used for retryable failures outside confirmation
    TimedOut,
    TerminalFailure,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Preparing => "preparing",
            Phase::Signing => "signing",
            Phase::Submitted => "submitted",
            Phase::Confirming => "confirming",
            Phase::Confirmed => "confirmed",
            Phase::FailedOnChain => "failed_on_chain",
            Phase::Rejected => "rejected",
            Phase::Expired => "expired",
            Phase::TimedOut => "timed_out",
            Phase::TerminalFailure => "terminal_failure",
        }
    }

    /// Terminal phases accept no further transition
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Phase::Confirmed | Phase::FailedOnChain | Phase::Rejected | Phase::TerminalFailure
        )
    }

    /// Between `Preparing` and `Confirming` inclusive
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Phase::Preparing | Phase::Signing | Phase::Submitted | Phase::Confirming
        )
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        match (*self, next) {
            (Idle, Preparing) => true,
            (Preparing, Signing) | (Signing, Submitted) | (Submitted, Confirming) => true,
            (Confirming, Confirmed) | (Confirming, FailedOnChain) => true,
            (from, Rejected) | (from, Expired) | (from, TimedOut) => from.is_active(),
            (Expired, Preparing) | (TimedOut, Preparing) => true,
            (Expired, TerminalFailure) | (TimedOut, TerminalFailure) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: Phase,
    pub to: Phase,
}

/// What to do after an attempt resolved retryably
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Retry { next_attempt: u32, delay: Duration },
    Exhausted(Cause),
}

/// Phase and attempt counter for a single request
#[derive(Debug, Clone)]
pub struct AttemptMachine {
    phase: Phase,
    attempt: u32,
    max_attempts: u32,
    backoff: RetryBackoff,
}

impl AttemptMachine {
    pub fn new(max_attempts: u32, backoff: RetryBackoff) -> Self {
        Self {
            phase: Phase::Idle,
            attempt: 0,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current attempt number, 1-based; 0 before the first attempt
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn transition(&mut self, next: Phase) -> Result<(), TransitionError> {
        if !self.phase.can_transition_to(next) {
            return Err(TransitionError {
                from: self.phase,
                to: next,
            });
        }
        if next == Phase::Preparing {
            if self.attempt >= self.max_attempts {
                return Err(TransitionError {
                    from: self.phase,
                    to: next,
                });
            }
            self.attempt += 1;
        }
        self.phase = next;
        Ok(())
    }

    /// Start the next attempt; returns its number
    pub fn begin_attempt(&mut self) -> Result<u32, TransitionError> {
        self.transition(Phase::Preparing)?;
        Ok(self.attempt)
    }

    /// Spend the current attempt confirming an earlier attempt's transaction
    /// rather than signing a new one
    pub fn rejoin_earlier(&mut self) -> Result<(), TransitionError> {
        if self.phase != Phase::Preparing || self.attempt < 2 {
            return Err(TransitionError {
                from: self.phase,
                to: Phase::Confirming,
            });
        }
        self.phase = Phase::Confirming;
        Ok(())
    }

    /// Record a retryable resolution of the current attempt and decide what follows
    pub fn resolve_retryable(&mut self, cause: Cause) -> Result<Decision, TransitionError> {
        let phase = match cause {
            Cause::ExpiredWindow => Phase::Expired,
            _ => Phase::TimedOut,
        };
        self.transition(phase)?;

        if self.attempt < self.max_attempts {
            Ok(Decision::Retry {
                next_attempt: self.attempt + 1,
                delay: self.backoff.delay_after(self.attempt),
            })
        } else {
            self.transition(Phase::TerminalFailure)?;
            Ok(Decision::Exhausted(Cause::RetriesExhausted {
                attempts: self.attempt,
                last: Box::new(cause),
            }))
        }
    }
}
