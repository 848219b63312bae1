//! Structured notification events.
//!
//! The core reports what it decided (eligibility, match, filter, ledger
//! transitions) through a narrow sink contract; whoever consumes them (a
//! tray UI, a log collector) is out of scope. The default sink routes to
//! `tracing` at the event's severity.

use crate::ledger::TransferStatus;
use crate::scan::IneligibleReason;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// One decision taken by the engine for one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum EventKind {
    EligibilityDecision {
        path: PathBuf,
        eligible: bool,
        reason: Option<IneligibleReason>,
    },
    MatchDecision {
        path: PathBuf,
        rule: Option<String>,
    },
    FilterDecision {
        path: PathBuf,
        rule: String,
        filter: String,
        matched: bool,
    },
    LedgerTransition {
        path: PathBuf,
        rule: String,
        status: TransferStatus,
        attempt_count: u32,
        error: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub severity: Severity,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(severity: Severity, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            kind,
        }
    }
}

/// Where engine decisions go. Implementations must be cheap and must never
/// block the scan.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Default sink: structured log lines via `tracing`.
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn emit(&self, event: Event) {
        let payload = serde_json::to_string(&event.kind).unwrap_or_default();
        match event.severity {
            Severity::Debug => tracing::debug!(event = %payload, "engine decision"),
            Severity::Info => tracing::info!(event = %payload, "engine decision"),
            Severity::Warn => tracing::warn!(event = %payload, "engine decision"),
            Severity::Error => tracing::error!(event = %payload, "engine decision"),
        }
    }
}

/// Collecting sink for tests and embedders that poll.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl NotificationSink for MemorySink {
    fn emit(&self, event: Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat() {
        let event = Event::new(
            Severity::Info,
            EventKind::MatchDecision {
                path: PathBuf::from("/watch/in/a.txt"),
                rule: Some("text".to_string()),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "matchDecision");
        assert_eq!(json["severity"], "info");
        assert_eq!(json["rule"], "text");
    }

    #[test]
    fn test_memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.emit(Event::new(
            Severity::Debug,
            EventKind::MatchDecision {
                path: PathBuf::from("/a"),
                rule: None,
            },
        ));
        sink.emit(Event::new(
            Severity::Error,
            EventKind::MatchDecision {
                path: PathBuf::from("/b"),
                rule: None,
            },
        ));
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].severity, Severity::Error);
    }
}
