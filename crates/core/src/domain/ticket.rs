use serde::{Deserialize, Serialize};

use crate::domain::entity::{Approvable, LifecycleStatus};
use crate::domain::meta::{ApprovalMeta, EntityId, EntityKind};
use crate::domain::value::{FieldKind, TrackedField};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    #[default]
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Canceled,
    Critical,
    Modified,
    Deleted,
}

impl LifecycleStatus for TicketStatus {
    const ALL: &'static [Self] = &[
        Self::Open,
        Self::InProgress,
        Self::Resolved,
        Self::Canceled,
        Self::Critical,
        Self::Modified,
        Self::Deleted,
    ];

    fn modified() -> Self {
        Self::Modified
    }

    fn deleted() -> Self {
        Self::Deleted
    }

    fn rejected() -> Self {
        Self::Canceled
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Resolved => "Resolved",
            Self::Canceled => "Canceled",
            Self::Critical => "Critical",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    #[serde(flatten)]
    pub meta: ApprovalMeta,
    pub status: TicketStatus,
    pub title: String,
    pub description: String,
    pub priority: String,
    #[serde(default)]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub subscriber_id: Option<EntityId>,
}

const TRACKED_FIELDS: &[TrackedField] = &[
    TrackedField::new("title", FieldKind::Text),
    TrackedField::new("description", FieldKind::Text),
    TrackedField::new("priority", FieldKind::Text),
    TrackedField::new("assignedTo", FieldKind::Text),
];

impl Approvable for Ticket {
    type Status = TicketStatus;

    const KIND: EntityKind = EntityKind::Ticket;

    fn tracked_fields() -> &'static [TrackedField] {
        TRACKED_FIELDS
    }

    fn meta(&self) -> &ApprovalMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ApprovalMeta {
        &mut self.meta
    }

    fn status(&self) -> TicketStatus {
        self.status
    }

    fn set_status(&mut self, status: TicketStatus) {
        self.status = status;
    }

    fn initial_status(&self) -> TicketStatus {
        TicketStatus::Open
    }

    fn default_approved_status(&self) -> TicketStatus {
        TicketStatus::Open
    }

    fn side_transition_allowed(from: TicketStatus, to: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (from, to),
            (Open, InProgress | Resolved | Canceled | Critical)
                | (InProgress, Open | Resolved | Canceled | Critical)
                | (Critical, InProgress | Resolved | Canceled)
                | (Resolved, Open)
        )
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::MissingField { path: "title".to_string() });
        }
        Ok(())
    }
}
