use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::meta::{ApprovalMeta, EntityKind};
use crate::domain::value::TrackedField;
use crate::errors::DomainError;

/// Domain lifecycle state of one entity type.
pub trait LifecycleStatus:
    Copy + Debug + PartialEq + Eq + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const ALL: &'static [Self];

    fn modified() -> Self;
    fn deleted() -> Self;
    /// Status a creation-pending record lands in when it is rejected.
    fn rejected() -> Self;
    fn as_str(&self) -> &'static str;

    fn parse(value: &str) -> Option<Self> {
        let wanted = normalize_status(value);
        Self::ALL.iter().copied().find(|status| normalize_status(status.as_str()) == wanted)
    }
}

fn normalize_status(raw: &str) -> String {
    raw.chars().filter(|ch| ch.is_ascii_alphanumeric()).collect::<String>().to_ascii_lowercase()
}

/// A named value that must be unique within one entity collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueKey {
    pub name: String,
    pub value: String,
}

impl UniqueKey {
    pub const BUSINESS_ID: &'static str = "businessId";

    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// An entity that goes through the propose / decide workflow.
///
/// Implementors serialize to a nested JSON document whose key paths match
/// [`Approvable::tracked_fields`], which is how the field tracker reads and merges values.
pub trait Approvable:
    Clone + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    type Status: LifecycleStatus;

    const KIND: EntityKind;

    /// Paths that participate in change proposals.
    fn tracked_fields() -> &'static [TrackedField];

    /// Paths an approver may set in a decision payload. Defaults to the tracked paths.
    fn decision_fields() -> &'static [TrackedField] {
        Self::tracked_fields()
    }

    fn meta(&self) -> &ApprovalMeta;
    fn meta_mut(&mut self) -> &mut ApprovalMeta;

    fn status(&self) -> Self::Status;
    fn set_status(&mut self, status: Self::Status);

    fn initial_status(&self) -> Self::Status;

    /// Status applied on approval of a record that has no prior status to return to.
    fn default_approved_status(&self) -> Self::Status;

    fn approvable_from(_status: Self::Status) -> bool {
        true
    }

    /// Operational status changes allowed outside the proposal workflow.
    fn side_transition_allowed(from: Self::Status, to: Self::Status) -> bool;

    fn unique_keys(&self) -> Vec<UniqueKey> {
        Vec::new()
    }

    /// Runs after an edit is approved; `persisted` is the record as it was before the decision.
    fn preserve_on_approval(&mut self, _persisted: &Self) {}

    fn validate(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
