//! Hash-chained audit trail

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where and why an audit chain fails verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("audit chain broken at record {index}: {reason}")]
pub struct ChainBreak {
    pub index: usize,
    pub reason: String,
}

/// Append-only audit trail with hash-chained events for tamper detection
#[derive(Debug, Clone, Default)]
pub struct AuditTrail {
    events: Vec<AuditEvent>,
    chain_hash: Option<String>,
}

impl AuditTrail {
    /// Create a new audit trail
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a trail from stored events, rejecting a broken chain
    pub fn from_events(events: Vec<AuditEvent>) -> Result<Self, ChainBreak> {
        verify_chain(&events)?;
        let chain_hash = events.last().and_then(|e| e.hash.clone());
        Ok(Self { events, chain_hash })
    }

    /// Link an event to the chain and append it
    pub fn add_event(&mut self, event: AuditEvent) -> &AuditEvent {
        let event = self.link(event);
        self.chain_hash = event.hash.clone();
        self.events.push(event);
        &self.events[self.events.len() - 1]
    }

    /// Link an event to the current head without appending it.
    ///
    /// Lets callers persist the event first and append it with
    /// [`AuditTrail::append_linked`] only once that succeeded.
    pub fn link(&self, mut event: AuditEvent) -> AuditEvent {
        event.sequence = self.events.len() as u64;
        event.previous_hash = self.chain_hash.clone();
        event.hash = Some(compute_hash(&event));
        event
    }

    /// Append an event produced by [`AuditTrail::link`]
    pub fn append_linked(&mut self, event: AuditEvent) -> Result<(), ChainBreak> {
        let index = self.events.len();
        if event.sequence != index as u64 || event.previous_hash != self.chain_hash {
            return Err(ChainBreak {
                index,
                reason: "event not linked to current head".to_string(),
            });
        }
        if event.hash.as_deref() != Some(compute_hash(&event).as_str()) {
            return Err(ChainBreak {
                index,
                reason: "content hash mismatch".to_string(),
            });
        }
        self.chain_hash = event.hash.clone();
        self.events.push(event);
        Ok(())
    }

    /// Verify the integrity of the audit trail
    pub fn verify(&self) -> bool {
        verify_chain(&self.events).is_ok()
    }

    /// Get all events, oldest first
    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Most recent events, newest first
    pub fn recent(&self, limit: usize) -> impl Iterator<Item = &AuditEvent> {
        self.events.iter().rev().take(limit)
    }

    /// Hash of the last event
    pub fn head(&self) -> Option<&str> {
        self.chain_hash.as_deref()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Check sequence numbers, links and hashes of a stored chain
pub fn verify_chain(events: &[AuditEvent]) -> Result<(), ChainBreak> {
    let mut prev_hash: Option<&String> = None;

    for (index, event) in events.iter().enumerate() {
        let broken = |reason: &str| ChainBreak {
            index,
            reason: reason.to_string(),
        };

        if event.sequence != index as u64 {
            return Err(broken("sequence gap"));
        }
        if event.previous_hash.as_ref() != prev_hash {
            return Err(broken("previous hash mismatch"));
        }
        if event.hash.as_deref() != Some(compute_hash(event).as_str()) {
            return Err(broken("content hash mismatch"));
        }

        prev_hash = event.hash.as_ref();
    }

    Ok(())
}

/// Hash an event's content and its link (excluding the hash field itself)
fn compute_hash(event: &AuditEvent) -> String {
    let mut hasher = Sha256::new();

    hasher.update(event.sequence.to_be_bytes());
    hasher.update(event.id.as_bytes());
    hasher.update(event.event_type.as_bytes());
    hasher.update(event.actor.as_bytes());
    hasher.update(event.data.to_string().as_bytes());
    if let Some(ref note) = event.note {
        hasher.update(note.as_bytes());
    }
    hasher.update(
        event
            .timestamp
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.update(event.severity.as_str().as_bytes());
    if let Some(ref prev) = event.previous_hash {
        hasher.update(prev.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

/// A single audit event in the trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    /// Position in the chain
    #[serde(default)]
    pub sequence: u64,

    /// Event type/category
    pub event_type: String,

    /// Who caused the event
    pub actor: String,

    /// Free-text note supplied by the actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Structured event data
    #[serde(default)]
    pub data: serde_json::Value,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Severity level
    pub severity: AuditSeverity,

    /// Hash of previous event (for chaining)
    pub previous_hash: Option<String>,

    /// Hash of this event
    pub hash: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(event_type: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            id: generate_event_id(),
            sequence: 0,
            event_type: event_type.into(),
            actor: actor.into(),
            note: None,
            data: serde_json::Value::Null,
            timestamp: Utc::now(),
            severity: AuditSeverity::Info,
            previous_hash: None,
            hash: None,
        }
    }

    /// Set event data
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        self.data = serde_json::to_value(data).unwrap_or_default();
        self
    }

    /// Set the actor's note
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    /// Set timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Decode the event data
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Generate a unique event ID using UUID v4
fn generate_event_id() -> String {
    format!("evt_{}", uuid::Uuid::new_v4())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    Info,
    Warning,
    High,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_trail() {
        let mut trail = AuditTrail::new();

        trail.add_event(AuditEvent::new("stage_advanced", "alice").with_data(("0", "1")));
        trail.add_event(AuditEvent::new("stage_rolled_back", "bob"));

        assert!(trail.verify());
        assert_eq!(trail.len(), 2);
        assert_eq!(trail.events()[1].sequence, 1);
        assert_eq!(
            trail.events()[1].previous_hash.as_deref(),
            trail.events()[0].hash.as_deref()
        );
        assert_eq!(trail.head(), trail.events()[1].hash.as_deref());
    }

    #[test]
    fn test_tamper_detection() {
        let mut trail = AuditTrail::new();

        trail.add_event(AuditEvent::new("event1", "alice"));
        trail.add_event(AuditEvent::new("event2", "alice"));

        // Tamper with an event
        trail.events[0].actor = "mallory".to_string();

        let err = verify_chain(trail.events()).unwrap_err();
        assert_eq!(err.index, 0);
        assert!(!trail.verify());
    }

    #[test]
    fn test_removed_event_breaks_chain() {
        let mut trail = AuditTrail::new();
        for i in 0..3 {
            trail.add_event(AuditEvent::new(format!("event{}", i), "ops"));
        }

        let mut events = trail.events().to_vec();
        events.remove(1);

        let err = AuditTrail::from_events(events).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn test_chain_survives_serialization() {
        let mut trail = AuditTrail::new();
        trail.add_event(
            AuditEvent::new("stage_set", "alice")
                .with_note(Some("canary looks good".into()))
                .with_data(serde_json::json!({"from": 1, "to": 3, "ratio": 0.25})),
        );

        let lines: Vec<String> = trail
            .events()
            .iter()
            .map(|e| serde_json::to_string(e).unwrap())
            .collect();
        let restored: Vec<AuditEvent> = lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        let rebuilt = AuditTrail::from_events(restored).unwrap();
        assert_eq!(rebuilt.head(), trail.head());
    }

    #[test]
    fn test_link_then_append() {
        let mut trail = AuditTrail::new();
        trail.add_event(AuditEvent::new("event0", "ops"));

        let linked = trail.link(AuditEvent::new("event1", "ops"));
        assert_eq!(trail.len(), 1);

        let stale = trail.link(AuditEvent::new("event1b", "ops"));
        trail.append_linked(linked).unwrap();
        assert!(trail.append_linked(stale).is_err());
        assert_eq!(trail.len(), 2);
        assert!(trail.verify());
    }

    #[test]
    fn test_recent_is_newest_first() {
        let mut trail = AuditTrail::new();
        for i in 0..5 {
            trail.add_event(AuditEvent::new(format!("event{}", i), "ops"));
        }

        let recent: Vec<_> = trail.recent(2).map(|e| e.event_type.as_str()).collect();
        assert_eq!(recent, vec!["event4", "event3"]);
    }
}
