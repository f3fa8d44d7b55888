//! Run event plumbing for Polesort
//!
//! The classification pass is synchronous and thread-agnostic: instead of
//! owning a UI or a thread, it pushes tagged event values into a sink the
//! caller provides. A frontend can render them, forward them over a channel,
//! or drop them.

use serde::{Deserialize, Serialize};

use crate::classify::RunTally;

/// Severity tag attached to log events, for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Routine progress detail (orbit shots, move summaries).
    Info,
    /// A shot of interest was recognized (nadir, zoom).
    Notice,
    /// A sequence completed validly.
    Success,
    Warning,
    Error,
}

/// Events emitted by a classification pass, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// Fraction of the input handled so far, in `[0, 1]`.
    Progress(f64),
    Log { severity: Severity, message: String },
    /// Running count of completed poles.
    PoleCount(u32),
    /// The final counters, emitted exactly once at end of stream.
    Tally(RunTally),
    /// End-of-run signal; no further events follow.
    Finished,
}

/// Receiver for [`RunEvent`]s.
pub trait EventSink {
    fn emit(&mut self, event: RunEvent);

    /// Convenience for the common log case.
    fn log(&mut self, severity: Severity, message: String) {
        self.emit(RunEvent::Log { severity, message });
    }
}

impl<F: FnMut(RunEvent)> EventSink for F {
    fn emit(&mut self, event: RunEvent) {
        self(event)
    }
}

/// Sink that discards every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: RunEvent) {}
}
