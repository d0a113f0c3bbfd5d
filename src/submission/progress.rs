//! Optional progress notifications for callers that render status

use std::time::Duration;

use super::attempt::AttemptRecord;
use super::state::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    AttemptStarted { attempt: u32, max_attempts: u32 },
    PhaseChanged { attempt: u32, phase: Phase },
    AttemptFinished(AttemptRecord),
    BackingOff { attempt: u32, delay: Duration },
}

/// Receives progress events. Implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn test_closure_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = move |event: &ProgressEvent| sink.lock().push(event.clone());

        observer.on_event(&ProgressEvent::AttemptStarted {
            attempt: 1,
            max_attempts: 3,
        });
        assert_eq!(seen.lock().len(), 1);
    }
}
