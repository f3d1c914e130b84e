//! Status and progress reporting.
//!
//! Engines push [`StatusEvent`]s into a host-supplied [`StatusSink`] as
//! they work. Any `FnMut(&StatusEvent)` closure is a sink.

use tracing::{info, warn};

use crate::status::StatusCode;

/// What an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A step started or finished.
    Info,
    /// Upload or download progress; see [`StatusEvent::progress`].
    Progress,
    /// The operation completed.
    Success,
    /// The operation failed; see [`StatusEvent::code`].
    Error,
}

/// One status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEvent {
    /// Human-readable message.
    pub message: String,
    /// Percentage for progress events.
    pub progress: Option<u8>,
    /// Event kind.
    pub kind: EventKind,
    /// Status code; `Ok` except for errors.
    pub code: StatusCode,
}

impl StatusEvent {
    /// An informational event.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            progress: None,
            kind: EventKind::Info,
            code: StatusCode::Ok,
        }
    }

    /// A progress event.
    #[must_use]
    pub fn progress(message: impl Into<String>, percent: u8) -> Self {
        Self {
            message: message.into(),
            progress: Some(percent),
            kind: EventKind::Progress,
            code: StatusCode::Ok,
        }
    }

    /// A completion event.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            progress: None,
            kind: EventKind::Success,
            code: StatusCode::Ok,
        }
    }

    /// A failure event.
    #[must_use]
    pub fn error(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            progress: None,
            kind: EventKind::Error,
            code,
        }
    }
}

/// Receives status events.
pub trait StatusSink: Send {
    /// Called for every event, in order.
    fn on_status(&mut self, event: &StatusEvent);
}

impl<F> StatusSink for F
where
    F: FnMut(&StatusEvent) + Send,
{
    fn on_status(&mut self, event: &StatusEvent) {
        self(event);
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn on_status(&mut self, _event: &StatusEvent) {}
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn on_status(&mut self, event: &StatusEvent) {
        match event.kind {
            EventKind::Error => warn!(code = ?event.code, "{}", event.message),
            EventKind::Progress => {
                info!(progress = event.progress.unwrap_or(0), "{}", event.message);
            }
            EventKind::Info | EventKind::Success => info!("{}", event.message),
        }
    }
}

/// Turns byte counts into percentages, reporting each value once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressTracker {
    last: Option<u8>,
}

impl ProgressTracker {
    /// Creates a tracker that has reported nothing yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Returns the new percentage if it differs from the last one reported.
    pub fn update(&mut self, done: u64, total: u64) -> Option<u8> {
        let percent = if total == 0 {
            100
        } else {
            u8::try_from(done.min(total) * 100 / total).unwrap_or(100)
        };
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }

    /// Forgets the last value.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |e: &StatusEvent| seen.push(e.message.clone());
            sink.on_status(&StatusEvent::info("connecting"));
            sink.on_status(&StatusEvent::success("done"));
        }
        assert_eq!(seen, vec!["connecting", "done"]);
    }

    #[test]
    fn test_progress_reports_changes_only() {
        let mut tracker = ProgressTracker::new();
        assert_eq!(tracker.update(0, 200), Some(0));
        assert_eq!(tracker.update(1, 200), None);
        assert_eq!(tracker.update(2, 200), Some(1));
        assert_eq!(tracker.update(500, 200), Some(100));
        assert_eq!(tracker.update(200, 200), None);
        assert_eq!(tracker.update(0, 0), None);
    }
}
