use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entity::{Approvable, LifecycleStatus, UniqueKey};
use crate::domain::meta::{ApprovalMeta, EntityKind};
use crate::domain::value::{FieldKind, TrackedField};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriberStatus {
    #[default]
    Added,
    Active,
    InActive,
    Rejected,
    Deleted,
    Modified,
    Suspended,
}

impl LifecycleStatus for SubscriberStatus {
    const ALL: &'static [Self] = &[
        Self::Added,
        Self::Active,
        Self::InActive,
        Self::Rejected,
        Self::Deleted,
        Self::Modified,
        Self::Suspended,
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
            Self::Added => "Added",
            Self::Active => "Active",
            Self::InActive => "InActive",
            Self::Rejected => "Rejected",
            Self::Deleted => "Deleted",
            Self::Modified => "Modified",
            Self::Suspended => "Suspended",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalContact {
    pub name: String,
    pub contact: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IspInfo {
    pub name: String,
    pub contact: String,
    pub broadband_plan: String,
    pub number_of_months: Option<i64>,
    pub otc: Option<Decimal>,
    pub mrc: Option<Decimal>,
    pub activation_date: Option<NaiveDate>,
    pub current_activation_date: Option<NaiveDate>,
    pub renewal_date: Option<NaiveDate>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub circuit_id: String,
}

/// A customer site served over a third-party ISP link.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    #[serde(flatten)]
    pub meta: ApprovalMeta,
    pub status: SubscriberStatus,
    pub customer_name: String,
    pub site_name: String,
    pub site_code: String,
    pub site_address: String,
    pub local_contact: LocalContact,
    pub isp_info: IspInfo,
    pub credentials: Credentials,
}

const TRACKED_FIELDS: &[TrackedField] = &[
    TrackedField::new("customerName", FieldKind::Text),
    TrackedField::new("siteName", FieldKind::Text),
    TrackedField::new("siteCode", FieldKind::Text),
    TrackedField::new("siteAddress", FieldKind::Text),
    TrackedField::new("localContact.name", FieldKind::Text),
    TrackedField::new("localContact.contact", FieldKind::Text),
    TrackedField::new("ispInfo.name", FieldKind::Text),
    TrackedField::new("ispInfo.contact", FieldKind::Text),
    TrackedField::new("ispInfo.broadbandPlan", FieldKind::Text),
    TrackedField::new("ispInfo.numberOfMonths", FieldKind::Integer),
    TrackedField::new("ispInfo.otc", FieldKind::Decimal),
    TrackedField::new("ispInfo.mrc", FieldKind::Decimal),
    TrackedField::new("credentials.username", FieldKind::Text),
    TrackedField::new("credentials.password", FieldKind::Text),
    TrackedField::new("credentials.circuitId", FieldKind::Text),
];

const DECISION_FIELDS: &[TrackedField] = &[
    TrackedField::new("customerName", FieldKind::Text),
    TrackedField::new("siteName", FieldKind::Text),
    TrackedField::new("siteCode", FieldKind::Text),
    TrackedField::new("siteAddress", FieldKind::Text),
    TrackedField::new("localContact.name", FieldKind::Text),
    TrackedField::new("localContact.contact", FieldKind::Text),
    TrackedField::new("ispInfo.name", FieldKind::Text),
    TrackedField::new("ispInfo.contact", FieldKind::Text),
    TrackedField::new("ispInfo.broadbandPlan", FieldKind::Text),
    TrackedField::new("ispInfo.numberOfMonths", FieldKind::Integer),
    TrackedField::new("ispInfo.otc", FieldKind::Decimal),
    TrackedField::new("ispInfo.mrc", FieldKind::Decimal),
    TrackedField::new("ispInfo.activationDate", FieldKind::Date),
    TrackedField::new("ispInfo.currentActivationDate", FieldKind::Date),
    TrackedField::new("ispInfo.renewalDate", FieldKind::Date),
    TrackedField::new("credentials.username", FieldKind::Text),
    TrackedField::new("credentials.password", FieldKind::Text),
    TrackedField::new("credentials.circuitId", FieldKind::Text),
];

impl Approvable for Subscriber {
    type Status = SubscriberStatus;

    const KIND: EntityKind = EntityKind::Subscriber;

    fn tracked_fields() -> &'static [TrackedField] {
        TRACKED_FIELDS
    }

    fn decision_fields() -> &'static [TrackedField] {
        DECISION_FIELDS
    }

    fn meta(&self) -> &ApprovalMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ApprovalMeta {
        &mut self.meta
    }

    fn status(&self) -> SubscriberStatus {
        self.status
    }

    fn set_status(&mut self, status: SubscriberStatus) {
        self.status = status;
    }

    fn initial_status(&self) -> SubscriberStatus {
        SubscriberStatus::Added
    }

    fn default_approved_status(&self) -> SubscriberStatus {
        SubscriberStatus::Active
    }

    fn approvable_from(status: SubscriberStatus) -> bool {
        matches!(
            status,
            SubscriberStatus::Added
                | SubscriberStatus::Modified
                | SubscriberStatus::Suspended
                | SubscriberStatus::Active
        )
    }

    fn side_transition_allowed(from: SubscriberStatus, to: SubscriberStatus) -> bool {
        use SubscriberStatus::*;
        matches!(
            (from, to),
            (Active, Suspended)
                | (Suspended, Active)
                | (Active, InActive)
                | (Suspended, InActive)
                | (InActive, Active)
        )
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        let site_code = self.site_code.trim();
        if site_code.is_empty() {
            return Vec::new();
        }
        vec![UniqueKey::new("siteCode", site_code.to_ascii_uppercase())]
    }

    /// Service dates belong to the billing cycle, not to the edit: an approved
    /// edit keeps whatever dates the record carried before it.
    fn preserve_on_approval(&mut self, persisted: &Self) {
        self.isp_info.activation_date = persisted.isp_info.activation_date;
        self.isp_info.current_activation_date = persisted.isp_info.current_activation_date;
        self.isp_info.renewal_date = persisted.isp_info.renewal_date;
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.customer_name.trim().is_empty() {
            return Err(DomainError::MissingField { path: "customerName".to_string() });
        }
        if self.site_code.trim().is_empty() {
            return Err(DomainError::MissingField { path: "siteCode".to_string() });
        }
        if let (Some(activation), Some(renewal)) =
            (self.isp_info.activation_date, self.isp_info.renewal_date)
        {
            if renewal < activation {
                return Err(DomainError::InvariantViolation(
                    "ispInfo.renewalDate must not precede ispInfo.activationDate".to_string(),
                ));
            }
        }
        Ok(())
    }
}
