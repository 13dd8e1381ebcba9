use serde::{Deserialize, Serialize};

use crate::domain::entity::{Approvable, LifecycleStatus, UniqueKey};
use crate::domain::meta::{ApprovalMeta, EntityKind};
use crate::domain::value::{FieldKind, TrackedField};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmployeeStatus {
    #[default]
    OnProcess,
    Active,
    InActive,
    Rejected,
    Deleted,
    Modified,
}

impl LifecycleStatus for EmployeeStatus {
    const ALL: &'static [Self] = &[
        Self::OnProcess,
        Self::Active,
        Self::InActive,
        Self::Rejected,
        Self::Deleted,
        Self::Modified,
    ];

    fn modified() -> Self {
        Self::Modified
    }

    fn deleted() -> Self {
        Self::Deleted
    }

    fn rejected() -> Self {
        Self::Rejected
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::OnProcess => "OnProcess",
            Self::Active => "Active",
            Self::InActive => "InActive",
            Self::Rejected => "Rejected",
            Self::Deleted => "Deleted",
            Self::Modified => "Modified",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
    #[serde(flatten)]
    pub meta: ApprovalMeta,
    pub status: EmployeeStatus,
    pub name: String,
    pub email: String,
    pub contact: String,
    pub roles: Vec<String>,
}

const TRACKED_FIELDS: &[TrackedField] = &[
    TrackedField::new("name", FieldKind::Text),
    TrackedField::new("email", FieldKind::Text),
    TrackedField::new("contact", FieldKind::Text),
    TrackedField::new("roles", FieldKind::TextList),
];

impl Approvable for Employee {
    type Status = EmployeeStatus;

    const KIND: EntityKind = EntityKind::Employee;

    fn tracked_fields() -> &'static [TrackedField] {
        TRACKED_FIELDS
    }

    fn meta(&self) -> &ApprovalMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ApprovalMeta {
        &mut self.meta
    }

    fn status(&self) -> EmployeeStatus {
        self.status
    }

    fn set_status(&mut self, status: EmployeeStatus) {
        self.status = status;
    }

    fn initial_status(&self) -> EmployeeStatus {
        EmployeeStatus::OnProcess
    }

    fn default_approved_status(&self) -> EmployeeStatus {
        EmployeeStatus::Active
    }

    fn side_transition_allowed(from: EmployeeStatus, to: EmployeeStatus) -> bool {
        matches!(
            (from, to),
            (EmployeeStatus::Active, EmployeeStatus::InActive)
                | (EmployeeStatus::InActive, EmployeeStatus::Active)
        )
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        let email = self.email.trim();
        if email.is_empty() {
            return Vec::new();
        }
        vec![UniqueKey::new("email", email.to_ascii_lowercase())]
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::MissingField { path: "name".to_string() });
        }
        if !self.email.contains('@') {
            return Err(DomainError::MalformedField {
                path: "email".to_string(),
                reason: "expected an email address".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Employee, EmployeeStatus};
    use crate::domain::entity::Approvable;
    use crate::errors::DomainError;

    #[test]
    fn email_must_look_like_an_address() {
        let employee = Employee {
            name: "Ravi".to_string(),
            email: "ravi.example.com".to_string(),
            ..Employee::default()
        };
        assert!(matches!(employee.validate(), Err(DomainError::MalformedField { .. })));
    }

    #[test]
    fn only_active_and_inactive_toggle_outside_approval() {
        assert!(Employee::side_transition_allowed(EmployeeStatus::Active, EmployeeStatus::InActive));
        assert!(!Employee::side_transition_allowed(
            EmployeeStatus::OnProcess,
            EmployeeStatus::Active
        ));
    }
}
