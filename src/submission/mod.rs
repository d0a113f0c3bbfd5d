//! Reliable transaction submission
//!
//! The supercomponent is split into focused modules:
//! - **errors**: closed failure taxonomy and the terminal failure type
//! - **classifier**: raw failure to cause with a retry disposition
//! - **request**: transaction requests and their retry settings
//! - **builder**: signing under a fresh validity window
//! - **confirm**: confirmation awaiter racing polls against a timer
//! - **state**: enumerable attempt state machine
//! - **engine**: the submit loop tying it all together
//! - **preconditions**: token account dependencies and their creation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use reliable_tx::submission::{SubmissionEngine, TransactionRequest};
//! # async fn example(
//! #     ledger: Arc<dyn reliable_tx::rpc_manager::LedgerRpc>,
//! #     payer: Arc<dyn reliable_tx::wallet::SigningProvider>,
//! #     instructions: Vec<solana_sdk::instruction::Instruction>,
//! # ) {
//! let engine = SubmissionEngine::new(ledger);
//! match engine.submit(TransactionRequest::new(instructions, payer)).await {
//!     Ok(outcome) => println!("{}", outcome.summary()),
//!     Err(failure) => eprintln!("{}", failure.summary()),
//! }
//! # }
//! ```

pub mod attempt;
pub mod backoff;
mod builder;
pub mod classifier;
pub mod confirm;
pub mod engine;
pub mod errors;
pub mod output;
pub mod preconditions;
pub mod progress;
pub mod request;
pub mod state;

pub use attempt::AttemptRecord;
pub use backoff::{PollSchedule, RetryBackoff};
pub use classifier::{classify, Classification, RawFailure};
pub use confirm::ConfirmationAwaiter;
pub use engine::SubmissionEngine;
pub use errors::{Cause, TerminalFailure};
pub use output::Outcome;
pub use preconditions::{PreconditionResolver, Resolution, ResolveError, ResourceDependency};
pub use progress::{ProgressEvent, ProgressObserver};
pub use request::{SubmitConfig, TransactionRequest};
pub use state::{AttemptMachine, Decision, Phase};
