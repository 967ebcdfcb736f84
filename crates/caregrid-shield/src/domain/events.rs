//! Security events and the sink they flow into.
//!
//! Events are emitted only; this subsystem never reads them back. Delivery
//! and storage belong to the platform's audit service, reached here through
//! the [`SecurityEventSink`] trait. The default sink writes structured
//! `tracing` records; tests capture events with [`RecordingEventSink`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What a guard detected (or failed to check)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Flood,
    Sustained,
    Hammering,
    SqlInjection,
    Xss,
    PathTraversal,
    BruteForce,
    Oversize,
    AuthRequired,
    /// A guard hit an internal failure and the request was let through
    GuardError,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Flood => "flood",
            EventCategory::Sustained => "sustained",
            EventCategory::Hammering => "hammering",
            EventCategory::SqlInjection => "sql_injection",
            EventCategory::Xss => "xss",
            EventCategory::PathTraversal => "path_traversal",
            EventCategory::BruteForce => "brute_force",
            EventCategory::Oversize => "oversize",
            EventCategory::AuthRequired => "auth_required",
            EventCategory::GuardError => "guard_error",
        }
    }

    /// Parse a category stored as block-entry metadata
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "flood" => Some(EventCategory::Flood),
            "sustained" => Some(EventCategory::Sustained),
            "hammering" => Some(EventCategory::Hammering),
            "sql_injection" => Some(EventCategory::SqlInjection),
            "xss" => Some(EventCategory::Xss),
            "path_traversal" => Some(EventCategory::PathTraversal),
            "brute_force" => Some(EventCategory::BruteForce),
            "oversize" => Some(EventCategory::Oversize),
            "auth_required" => Some(EventCategory::AuthRequired),
            "guard_error" => Some(EventCategory::GuardError),
            _ => None,
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alerting weight of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Structured record of a detection or internal failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique event id
    pub id: Uuid,
    pub category: EventCategory,
    /// Identity the event concerns (resolved client address)
    pub identity: String,
    pub severity: Severity,
    /// Free-form context: matched pattern, counts, paths
    pub details: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(category: EventCategory, identity: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            identity: identity.into(),
            severity,
            details: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach one detail entry (builder style)
    pub fn with_detail(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// External collaborator receiving events for audit and alerting.
/// Implementations must not block the request path for long.
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

/// Sink that writes events as structured tracing records, one level per
/// severity. This is the production default; log shipping picks them up.
#[derive(Debug, Default, Clone)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl SecurityEventSink for TracingEventSink {
    fn record(&self, event: SecurityEvent) {
        let details = serde_json::Value::Object(event.details);
        match event.severity {
            Severity::Low => info!(
                event_id = %event.id,
                category = %event.category,
                identity = %event.identity,
                %details,
                "security event"
            ),
            Severity::High => warn!(
                event_id = %event.id,
                category = %event.category,
                identity = %event.identity,
                %details,
                "security event"
            ),
            Severity::Critical => error!(
                event_id = %event.id,
                category = %event.category,
                identity = %event.identity,
                %details,
                "security event"
            ),
        }
    }
}

/// In-memory sink capturing every event, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().clone()
    }

    /// Number of events recorded for one category
    pub fn count(&self, category: EventCategory) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.category == category)
            .count()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<SecurityEvent> {
        std::mem::take(&mut self.events.lock())
    }
}

impl SecurityEventSink for RecordingEventSink {
    fn record(&self, event: SecurityEvent) {
        self.events.lock().push(event);
    }
}
