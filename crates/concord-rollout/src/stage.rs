//! Rollout stages, state and transition records

use chrono::{DateTime, Utc};
use concord_telemetry::AuditEvent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Share of traffic routed to the new cohort at each stage
pub const STAGE_PERCENTAGES: [u8; 5] = [0, 5, 25, 50, 100];

/// A rollout stage, 0 (everyone legacy) through 4 (everyone new)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stage(u8);

impl Stage {
    pub const OFF: Stage = Stage(0);
    pub const MAX: Stage = Stage(4);

    /// Stage for an index, if valid
    pub fn new(index: u8) -> Option<Self> {
        (index <= Self::MAX.0).then_some(Self(index))
    }

    pub fn index(&self) -> u8 {
        self.0
    }

    /// Percentage of callers in the new cohort
    pub fn percentage(&self) -> u8 {
        STAGE_PERCENTAGES[self.0 as usize]
    }

    /// Following stage, `None` at the last one
    pub fn next(&self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    pub fn is_max(&self) -> bool {
        *self == Self::MAX
    }

    /// All stages in order
    pub fn all() -> impl Iterator<Item = Stage> {
        (0..=Self::MAX.0).map(Stage)
    }
}

impl TryFrom<u8> for Stage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("invalid rollout stage {}", value))
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> Self {
        stage.0
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}%)", self.0, self.percentage())
    }
}

/// Current rollout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutState {
    pub stage: Stage,

    /// Always `stage.percentage()`
    pub rollout_percentage: u8,

    /// Bumped on every effective stage change
    pub version: u64,

    pub updated_at: DateTime<Utc>,

    pub updated_by: String,

    #[serde(default)]
    pub notes: Option<String>,
}

impl RolloutState {
    /// Stage 0, never changed
    pub fn initial() -> Self {
        Self {
            stage: Stage::OFF,
            rollout_percentage: Stage::OFF.percentage(),
            version: 0,
            updated_at: Utc::now(),
            updated_by: "system".to_string(),
            notes: None,
        }
    }

    /// State after moving to `stage`
    pub fn moved_to(&self, stage: Stage, actor: &str, notes: Option<String>) -> Self {
        Self {
            stage,
            rollout_percentage: stage.percentage(),
            version: self.version + 1,
            updated_at: Utc::now(),
            updated_by: actor.to_string(),
            notes,
        }
    }
}

/// Kind of stage change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Advance,
    Rollback,
    SetStage,
}

impl TransitionKind {
    /// Audit event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Advance => "rollout_advanced",
            Self::Rollback => "rollout_rolled_back",
            Self::SetStage => "rollout_stage_set",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Rollback => "rollback",
            Self::SetStage => "set_stage",
        }
    }
}

/// Before/after payload stored in each audit event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageChange {
    pub kind: TransitionKind,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub from_percentage: u8,
    pub to_percentage: u8,
    pub version: u64,
}

impl StageChange {
    pub fn between(kind: TransitionKind, before: &RolloutState, after: &RolloutState) -> Self {
        Self {
            kind,
            from_stage: before.stage,
            to_stage: after.stage,
            from_percentage: before.rollout_percentage,
            to_percentage: after.rollout_percentage,
            version: after.version,
        }
    }

    /// Audit event recording this change
    pub fn to_event(&self, after: &RolloutState) -> AuditEvent {
        AuditEvent::new(self.kind.event_type(), after.updated_by.clone())
            .with_data(self)
            .with_note(after.notes.clone())
            .with_timestamp(after.updated_at)
    }
}

/// Outcome of a stage change request
#[derive(Debug, Clone, Serialize)]
pub struct Transition {
    /// State after the request
    pub state: RolloutState,

    pub previous_stage: Stage,

    /// False when the target was already the current stage
    pub changed: bool,

    pub timestamp: DateTime<Utc>,

    /// Audit event written for the change
    pub record_id: Option<String>,
}

/// One audited stage change, as returned by history queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub kind: TransitionKind,
    pub from_stage: Stage,
    pub to_stage: Stage,
    pub from_percentage: u8,
    pub to_percentage: u8,
    pub version: u64,
    pub actor: String,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub hash: Option<String>,
}

impl HistoryEntry {
    /// Decode an audit event; `None` if it is not a stage change
    pub fn from_event(event: &AuditEvent) -> Option<Self> {
        let change: StageChange = event.data_as()?;
        Some(Self {
            id: event.id.clone(),
            kind: change.kind,
            from_stage: change.from_stage,
            to_stage: change.to_stage,
            from_percentage: change.from_percentage,
            to_percentage: change.to_percentage,
            version: change.version,
            actor: event.actor.clone(),
            notes: event.note.clone(),
            timestamp: event.timestamp,
            hash: event.hash.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_percentages() {
        let percentages: Vec<u8> = Stage::all().map(|s| s.percentage()).collect();
        assert_eq!(percentages, vec![0, 5, 25, 50, 100]);
        assert_eq!(Stage::MAX.next(), None);
        assert_eq!(Stage::OFF.next(), Stage::new(1));
        assert!(Stage::new(5).is_none());
    }

    #[test]
    fn test_stage_serde_rejects_out_of_range() {
        assert_eq!(serde_json::to_string(&Stage::MAX).unwrap(), "4");
        assert!(serde_json::from_str::<Stage>("7").is_err());
    }

    #[test]
    fn test_history_entry_from_event() {
        let before = RolloutState::initial();
        let after = before.moved_to(Stage::MAX, "alice", Some("full launch".into()));
        let change = StageChange::between(TransitionKind::SetStage, &before, &after);

        let entry = HistoryEntry::from_event(&change.to_event(&after)).unwrap();

        assert_eq!(entry.kind, TransitionKind::SetStage);
        assert_eq!(entry.to_percentage, 100);
        assert_eq!(entry.actor, "alice");
        assert_eq!(entry.notes.as_deref(), Some("full launch"));
        assert_eq!(entry.version, 1);

        assert!(HistoryEntry::from_event(&AuditEvent::new("other", "bob")).is_none());
    }
}
