use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::domain::entity::Approvable;
use crate::domain::meta::{ActorRef, EntityKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Propose,
    Approve,
    Reject,
    SideTransition,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Propose => "propose",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::SideTransition => "side_transition",
            Self::Delete => "delete",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(Self::Create),
            "propose" => Some(Self::Propose),
            "approve" => Some(Self::Approve),
            "reject" => Some(Self::Reject),
            "side_transition" => Some(Self::SideTransition),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "rejected" => Some(Self::Rejected),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Append-only record of one action against one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub business_id: Option<String>,
    pub action: AuditAction,
    pub performed_by: ActorRef,
    pub outcome: AuditOutcome,
    /// Nested `{previous, current}` snapshot for proposals and decisions; `null` otherwise.
    pub changes: Value,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        action: AuditAction,
        performed_by: ActorRef,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            entity_kind,
            entity_id: entity_id.into(),
            business_id: None,
            action,
            performed_by,
            outcome,
            changes: Value::Null,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn for_entity<E: Approvable>(
        entity: &E,
        action: AuditAction,
        performed_by: ActorRef,
        outcome: AuditOutcome,
    ) -> Self {
        let meta = entity.meta();
        let mut event = Self::new(E::KIND, meta.id.to_string(), action, performed_by, outcome);
        event.business_id = Some(meta.business_id.0.clone());
        event
    }

    pub fn with_changes(mut self, changes: Value) -> Self {
        self.changes = changes;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards audit events to the `tracing` pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        info!(
            event_name = "audit.recorded",
            audit_event_id = %event.event_id,
            entity_kind = event.entity_kind.as_str(),
            entity_id = %event.entity_id,
            business_id = event.business_id.as_deref().unwrap_or(""),
            action = event.action.as_str(),
            actor = %event.performed_by,
            outcome = event.outcome.as_str(),
            "audit event"
        );
    }
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn emit(&self, event: AuditEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
    use crate::domain::meta::{ActorRef, BusinessId, EntityKind};
    use crate::domain::subscriber::Subscriber;

    #[test]
    fn in_memory_sink_records_events_with_entity_fields() {
        let sink = InMemoryAuditSink::default();
        let mut subscriber = Subscriber::default();
        subscriber.meta.business_id = BusinessId("SUB-00042".to_owned());

        sink.emit(
            AuditEvent::for_entity(
                &subscriber,
                AuditAction::Propose,
                ActorRef::new("emp-7"),
                AuditOutcome::Success,
            )
            .with_changes(json!({"previous": {"ispInfo": {"mrc": "500"}}}))
            .with_metadata("status", "Modified"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_kind, EntityKind::Subscriber);
        assert_eq!(events[0].business_id.as_deref(), Some("SUB-00042"));
        assert_eq!(events[0].changes["previous"]["ispInfo"]["mrc"], "500");
        assert!(events[0].metadata.contains_key("status"));
    }

    #[test]
    fn drain_empties_the_sink() {
        let sink = InMemoryAuditSink::default();
        sink.emit(AuditEvent::new(
            EntityKind::Ticket,
            "t-1",
            AuditAction::Delete,
            ActorRef::new("emp-1"),
            AuditOutcome::Success,
        ));

        assert_eq!(sink.drain().len(), 1);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn action_and_outcome_names_round_trip() {
        for action in [
            AuditAction::Create,
            AuditAction::Propose,
            AuditAction::Approve,
            AuditAction::Reject,
            AuditAction::SideTransition,
            AuditAction::Delete,
        ] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditOutcome::parse("rejected"), Some(AuditOutcome::Rejected));
    }
}
