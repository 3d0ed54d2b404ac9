//! Structured outcome log for a merge/export run.
//!
//! The engine reports progress and per-record anomalies as an ordered
//! sequence of [`RunEvent`]s collected in a [`RunLog`] that is handed back
//! to the caller next to the primary result. Each record is mirrored to
//! `tracing` at the matching level so interactive callers still get live
//! diagnostics without the engine owning any global logging state.

use tracing::{debug, error, info, warn};

/// Severity attached to a single run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// One entry in the ordered outcome log.
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub level: EventLevel,
    pub message: String,
}

/// Ordered collection of events recorded over one run.
#[derive(Debug, Default)]
pub struct RunLog {
    events: Vec<RunEvent>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event and mirrors it to the tracing subscriber.
    pub fn record(&mut self, level: EventLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            EventLevel::Debug => debug!("{message}"),
            EventLevel::Info => info!("{message}"),
            EventLevel::Warning => warn!("{message}"),
            EventLevel::Error => error!("{message}"),
        }
        self.events.push(RunEvent { level, message });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Debug, message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(EventLevel::Error, message);
    }

    /// All events recorded so far, in order.
    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    /// Number of warning-level events, e.g. unresolved customer names.
    pub fn warning_count(&self) -> usize {
        self.events
            .iter()
            .filter(|event| event.level == EventLevel::Warning)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_keep_insertion_order() {
        let mut log = RunLog::new();
        log.info("first");
        log.warning("second");
        log.debug("third");

        let messages: Vec<&str> = log
            .events()
            .iter()
            .map(|event| event.message.as_str())
            .collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
        assert_eq!(log.warning_count(), 1);
    }
}
