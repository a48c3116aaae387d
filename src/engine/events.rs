//! Structured event logging for the reconstruction pipeline.
//!
//! Every noteworthy decision the engine takes (a fold, a recognized idiom or
//! control structure, an inserted cast, an operation kept opaque, a failed
//! function) is recorded as an [`Event`]. The log can be inspected for
//! debugging and tests or safely ignored.
//!
//! # Architecture
//!
//! - [`Event`] - A single recorded event
//! - [`EventLog`] - Append-only collection with query and summary helpers
//! - [`EventBuilder`] - Fluent API for creating events
//!
//! # Example
//!
//! ```rust
//! use formscope::engine::{EventKind, EventLog};
//!
//! let log = EventLog::new();
//! log.record(EventKind::IdiomRecognized)
//!     .function("abs")
//!     .at(3)
//!     .message("(abs arg0)");
//! log.warn("unpaired conditional move");
//!
//! assert!(log.has(EventKind::IdiomRecognized));
//! assert_eq!(log.warnings().count(), 1);
//! ```

use std::{collections::HashMap, fmt};

/// Categories of events that can be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Stack entries were combined into a compound expression.
    ExpressionFolded,
    /// A multi-instruction idiom was replaced by a single element.
    IdiomRecognized,
    /// A control region was turned into a structured element.
    ControlStructureRecognized,
    /// An operand was wrapped in a cast.
    CastInserted,
    /// An operation had no fold rule and was kept as an opaque wrapper.
    OpaqueOperation,

    /// Reconstruction of a function started.
    FunctionStarted,
    /// Reconstruction of a function completed.
    FunctionCompleted,
    /// Reconstruction of a function was abandoned.
    FunctionFailed,

    /// Informational message.
    Info,
    /// Warning (something unexpected but recoverable).
    Warning,
    /// Error (something failed).
    Error,
}

impl EventKind {
    /// Returns a human-readable description of this event kind.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::ExpressionFolded => "expression folded",
            Self::IdiomRecognized => "idiom recognized",
            Self::ControlStructureRecognized => "control structure recognized",
            Self::CastInserted => "cast inserted",
            Self::OpaqueOperation => "opaque operation",
            Self::FunctionStarted => "function started",
            Self::FunctionCompleted => "function completed",
            Self::FunctionFailed => "function failed",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// Returns true if this event represents a rewrite of the tree.
    #[must_use]
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Self::ExpressionFolded
                | Self::IdiomRecognized
                | Self::ControlStructureRecognized
                | Self::CastInserted
        )
    }

    /// Returns true if this is a diagnostic event (info/warning/error).
    #[must_use]
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Info | Self::Warning | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A single logged event.
#[derive(Debug, Clone)]
pub struct Event {
    /// The type of event.
    pub kind: EventKind,
    /// The function the event belongs to (if applicable).
    pub function: Option<String>,
    /// Instruction index within the function.
    pub location: Option<usize>,
    /// Human-readable description.
    pub message: String,
}

impl Event {
    fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            function: None,
            location: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.function, self.location) {
            (Some(function), Some(location)) => {
                write!(f, "[{}] {function}@{location}: {}", self.kind, self.message)
            }
            (Some(function), None) => write!(f, "[{}] {function}: {}", self.kind, self.message),
            _ => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Builder for creating events with a fluent API.
///
/// Created by [`EventLog::record`]. The event is added to the log when the
/// builder is dropped.
pub struct EventBuilder<'a> {
    log: &'a EventLog,
    kind: EventKind,
    function: Option<String>,
    location: Option<usize>,
    message: Option<String>,
}

impl<'a> EventBuilder<'a> {
    fn new(log: &'a EventLog, kind: EventKind) -> Self {
        Self {
            log,
            kind,
            function: None,
            location: None,
            message: None,
        }
    }

    /// Sets the function the event belongs to.
    pub fn function(mut self, name: impl Into<String>) -> Self {
        self.function = Some(name.into());
        self
    }

    /// Sets the instruction index the event refers to.
    pub fn at(mut self, location: usize) -> Self {
        self.location = Some(location);
        self
    }

    /// Sets a custom message describing the event.
    pub fn message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl Drop for EventBuilder<'_> {
    fn drop(&mut self) {
        let message = self
            .message
            .take()
            .unwrap_or_else(|| self.kind.description().to_string());

        self.log.events.push(Event {
            kind: self.kind,
            function: self.function.take(),
            location: self.location.take(),
            message,
        });
    }
}

/// Collection of events from reconstruction.
///
/// This type is thread-safe: events can be appended concurrently from
/// multiple threads using shared references (`&self`), which is how the batch
/// driver collects events from functions processed in parallel.
#[derive(Debug)]
pub struct EventLog {
    events: boxcar::Vec<Event>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for EventLog {
    fn clone(&self) -> Self {
        let new_log = Self::new();
        new_log.merge(self);
        new_log
    }
}

impl EventLog {
    /// Creates an empty event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Returns true if no events have been logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Returns the total number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// Starts building a new event of the given kind.
    ///
    /// The event is added when the builder is dropped.
    pub fn record(&self, kind: EventKind) -> EventBuilder<'_> {
        EventBuilder::new(self, kind)
    }

    /// Records an informational message.
    pub fn info(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Info, message));
    }

    /// Records a warning message.
    pub fn warn(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Warning, message));
    }

    /// Records an error message.
    pub fn error(&self, message: impl Into<String>) {
        self.events.push(Event::new(EventKind::Error, message));
    }

    /// Appends copies of all events of `other`.
    pub fn merge(&self, other: &EventLog) {
        for (_, event) in &other.events {
            self.events.push(event.clone());
        }
    }

    /// Returns true if any event of the given kind exists.
    #[must_use]
    pub fn has(&self, kind: EventKind) -> bool {
        self.events.iter().any(|(_, e)| e.kind == kind)
    }

    /// Counts events of the given kind.
    #[must_use]
    pub fn count_kind(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|(_, e)| e.kind == kind).count()
    }

    /// Returns an iterator over all events.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Returns an iterator over events of a specific kind.
    pub fn filter_kind(&self, kind: EventKind) -> impl Iterator<Item = &Event> + '_ {
        self.events
            .iter()
            .filter_map(move |(_, e)| if e.kind == kind { Some(e) } else { None })
    }

    /// Returns an iterator over events of a specific function.
    pub fn filter_function<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter_map(move |(_, e)| {
            if e.function.as_deref() == Some(name) {
                Some(e)
            } else {
                None
            }
        })
    }

    /// Returns an iterator over warning events.
    pub fn warnings(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Warning)
    }

    /// Returns an iterator over error events.
    pub fn errors(&self) -> impl Iterator<Item = &Event> + '_ {
        self.filter_kind(EventKind::Error)
    }

    /// Counts events grouped by kind.
    #[must_use]
    pub fn count_by_kind(&self) -> HashMap<EventKind, usize> {
        let mut counts = HashMap::new();
        for (_, event) in &self.events {
            *counts.entry(event.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Generates a human-readable summary of all transformation events.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "no events".to_string();
        }

        let mut parts: Vec<String> = self
            .count_by_kind()
            .iter()
            .filter(|(k, _)| k.is_transformation())
            .map(|(kind, count)| format!("{} {}", count, kind.description()))
            .collect();

        if parts.is_empty() {
            return format!("{} events", self.len());
        }

        parts.sort();
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_records_on_drop() {
        let log = EventLog::new();
        log.record(EventKind::CastInserted)
            .function("f")
            .at(4)
            .message("(the-as int arg1)");
        log.record(EventKind::FunctionStarted).function("g");

        assert_eq!(log.len(), 2);
        let event = log.filter_kind(EventKind::CastInserted).next().unwrap();
        assert_eq!(event.location, Some(4));
        assert_eq!(event.to_string(), "[cast inserted] f@4: (the-as int arg1)");
        assert_eq!(log.filter_function("g").count(), 1);
    }

    #[test]
    fn summary_counts_transformations() {
        let log = EventLog::new();
        assert_eq!(log.summary(), "no events");
        log.record(EventKind::IdiomRecognized);
        log.record(EventKind::IdiomRecognized);
        log.record(EventKind::CastInserted);
        log.info("not counted");
        assert_eq!(log.summary(), "1 cast inserted, 2 idiom recognized");
    }

    #[test]
    fn merge_and_clone() {
        let a = EventLog::new();
        a.warn("first");
        let b = EventLog::new();
        b.error("second");
        a.merge(&b);
        let copy = a.clone();
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.errors().count(), 1);
        assert_eq!(copy.warnings().count(), 1);
    }
}
