//! # Runtime events emitted by the daemon and process engines.
//!
//! [`EventKind`] classifies events across three categories:
//! - **Statement lifecycle**: one statement's instance moving through
//!   initializing → up → down/dying → died.
//! - **Process milestones**: victory (the whole chain is up) and the end of a
//!   retreat.
//! - **Daemon control**: shutdown requested.
//!
//! [`Event`] carries metadata: the owning process, the statement index, an
//! error message, a retry delay.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so consumers can order events correctly even when they are
//! delivered through async channels.
//!
//! ## Event flow examples
//!
//! ### Chain coming up
//! ```text
//! StatementInitializing{0} → StatementUp{0}
//!   → StatementInitializing{1} → StatementUp{1}
//!   → ... → ProcessUp
//! ```
//!
//! ### Upstream statement going down
//! ```text
//! StatementDown{0}
//!   → StatementDying{2} → StatementDied{2}
//!   → StatementDying{1} → StatementDied{1}
//!   → (StatementUp{0} again) → StatementInitializing{1} → ...
//! ```
//!
//! ### Failed advance
//! ```text
//! StatementInitializing{1} → RetryScheduled{1, delay}
//!   → (deadline) → StatementInitializing{1} → ...
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Daemon control ===
    /// Shutdown requested (termination signal received).
    ShutdownRequested,

    // === Statement lifecycle ===
    /// The engine is materializing arguments and creating the instance.
    StatementInitializing,
    /// The instance reported up; dependents may advance.
    StatementUp,
    /// The instance reported down; dependents will be torn down.
    StatementDown,
    /// The instance is terminating (asked to, or on its own).
    StatementDying,
    /// The instance finished terminating and was destroyed.
    StatementDied,
    /// An advance failed; the statement retries after the carried delay.
    RetryScheduled,

    // === Process milestones ===
    /// Every statement of the process is up.
    ProcessUp,
    /// The process finished retreating and is gone.
    ProcessRetreated,
}

/// Runtime event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for display only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Owning process name, if applicable.
    pub process: Option<String>,
    /// Statement index within the process, if applicable.
    pub statement: Option<usize>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
    /// Retry delay, for [`EventKind::RetryScheduled`].
    pub delay: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            process: None,
            statement: None,
            error: None,
            delay: None,
        }
    }

    /// Attaches the owning process name.
    pub fn with_process(mut self, name: impl Into<String>) -> Self {
        self.process = Some(name.into());
        self
    }

    /// Attaches a statement index.
    pub fn with_statement(mut self, index: usize) -> Self {
        self.statement = Some(index);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches a retry delay.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::now(EventKind::ProcessUp);
        let b = Event::now(EventKind::ProcessUp);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::RetryScheduled)
            .with_process("lan")
            .with_statement(2)
            .with_error("boom")
            .with_delay(Duration::from_secs(10));

        assert_eq!(ev.process.as_deref(), Some("lan"));
        assert_eq!(ev.statement, Some(2));
        assert_eq!(ev.error.as_deref(), Some("boom"));
        assert_eq!(ev.delay, Some(Duration::from_secs(10)));
    }
}
