use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::value::ChangeSet;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub Uuid);

impl EntityId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessId(pub String);

impl fmt::Display for BusinessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to the employee acting on a record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorRef(pub String);

impl ActorRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Employee,
    Subscriber,
    Payment,
    Ticket,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [Self::Employee, Self::Subscriber, Self::Payment, Self::Ticket];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Subscriber => "subscriber",
            Self::Payment => "payment",
            Self::Ticket => "ticket",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "employee" | "employees" => Some(Self::Employee),
            "subscriber" | "subscribers" => Some(Self::Subscriber),
            "payment" | "payments" => Some(Self::Payment),
            "ticket" | "tickets" => Some(Self::Ticket),
            _ => None,
        }
    }

    pub fn business_id_prefix(&self) -> &'static str {
        match self {
            Self::Employee => "EMP-",
            Self::Subscriber => "SUB-",
            Self::Payment => "TR-",
            Self::Ticket => "TKT-",
        }
    }

    pub fn business_id_digits(&self) -> usize {
        match self {
            Self::Employee | Self::Subscriber => 5,
            Self::Payment | Self::Ticket => 10,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" | "approve" => Some(Self::Approved),
            "rejected" | "reject" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change proposal: the tracked-path snapshots before and after the edit.
///
/// `previous` and `current` always carry the same set of paths.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModifiedData {
    pub previous: ChangeSet,
    pub current: ChangeSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_status: Option<String>,
    pub modified_by: ActorRef,
    pub modified_at: DateTime<Utc>,
}

/// Bookkeeping shared by every approvable record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalMeta {
    pub id: EntityId,
    #[serde(rename = "businessId")]
    pub business_id: BusinessId,
    pub request_status: RequestStatus,
    #[serde(rename = "modifiedData", default, skip_serializing_if = "Option::is_none")]
    pub modified_data: Option<ModifiedData>,
    pub created_by: ActorRef,
    #[serde(default)]
    pub decision_by: Option<ActorRef>,
    #[serde(default)]
    pub deleted_by: Option<ActorRef>,
    #[serde(rename = "isDeleted", default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub version: u64,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Default for ApprovalMeta {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::default(),
            business_id: BusinessId::default(),
            request_status: RequestStatus::Pending,
            modified_data: None,
            created_by: ActorRef::default(),
            decision_by: None,
            deleted_by: None,
            is_deleted: false,
            remark: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl ApprovalMeta {
    /// True while an edit (not a first-time creation) awaits a decision.
    pub fn has_pending_edit(&self) -> bool {
        self.request_status == RequestStatus::Pending && self.modified_data.is_some()
    }
}
