//! Change proposals and decisions over approvable entities.
//!
//! [`machine`] holds the pure status × request-status rules; [`ApprovalService`] runs them
//! against an [`EntityStore`](crate::store::EntityStore) with guarded writes, authorization and audit.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::entity::Approvable;
use crate::domain::meta::RequestStatus;
use crate::domain::value::ChangeSet;
use crate::errors::DomainError;

pub mod bulk;
pub mod machine;
pub mod service;

pub use bulk::{BulkDecisionItem, BulkItemFailure, BulkOutcome};
pub use machine::ProposalOutcome;
pub use service::ApprovalService;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn parse(value: &str) -> Option<Self> {
        match RequestStatus::parse(value)? {
            RequestStatus::Approved => Some(Self::Approve),
            RequestStatus::Rejected => Some(Self::Reject),
            RequestStatus::Pending => None,
        }
    }

    pub fn request_status(&self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => f.write_str("approve"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

/// A partial update over tracked fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Proposal {
    pub fields: ChangeSet,
    pub remark: Option<String>,
    /// Version the caller read; a mismatch is reported as a stale write.
    pub expected_version: Option<u64>,
}

impl Proposal {
    pub fn new(fields: ChangeSet) -> Self {
        Self { fields, ..Self::default() }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Reads tracked fields, `remark` and `version` from a nested JSON update body.
    pub fn from_json<E: Approvable>(payload: &Value) -> Result<Self, DomainError> {
        Ok(Self {
            fields: ChangeSet::from_payload(E::tracked_fields(), payload)?,
            remark: text_field(payload, "remark"),
            expected_version: payload.get("version").and_then(Value::as_u64),
        })
    }
}

/// Approver-supplied values that accompany a decision or side transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecisionPayload {
    pub status: Option<String>,
    pub fields: ChangeSet,
    pub remark: Option<String>,
}

impl DecisionPayload {
    pub fn with_status(status: impl Into<String>) -> Self {
        Self { status: Some(status.into()), ..Self::default() }
    }

    pub fn with_remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = Some(remark.into());
        self
    }

    pub fn with_fields(mut self, fields: ChangeSet) -> Self {
        self.fields = fields;
        self
    }

    /// Reads `status`, `remark` and the entity's decision fields from a nested JSON body.
    pub fn from_json<E: Approvable>(payload: &Value) -> Result<Self, DomainError> {
        Ok(Self {
            status: text_field(payload, "status"),
            fields: ChangeSet::from_payload(E::decision_fields(), payload)?,
            remark: text_field(payload, "remark"),
        })
    }
}

fn text_field(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{Decision, DecisionPayload, Proposal};
    use crate::domain::subscriber::Subscriber;
    use crate::domain::value::FieldValue;

    #[test]
    fn decision_accepts_verbs_and_request_statuses() {
        assert_eq!(Decision::parse("approve"), Some(Decision::Approve));
        assert_eq!(Decision::parse("rejected"), Some(Decision::Reject));
        assert_eq!(Decision::parse("pending"), None);
    }

    #[test]
    fn proposal_body_keeps_tracked_fields_only() {
        let proposal = Proposal::from_json::<Subscriber>(&json!({
            "ispInfo": {"mrc": 600, "renewalDate": "2026-01-01"},
            "remark": "plan upgrade",
            "version": 4
        }))
        .expect("proposal");

        assert_eq!(proposal.fields.len(), 1);
        assert_eq!(
            proposal.fields.value_at("ispInfo.mrc"),
            Some(&FieldValue::Decimal(Decimal::new(600, 0)))
        );
        assert_eq!(proposal.remark.as_deref(), Some("plan upgrade"));
        assert_eq!(proposal.expected_version, Some(4));
    }

    #[test]
    fn decision_body_may_set_service_dates() {
        let payload = DecisionPayload::from_json::<Subscriber>(&json!({
            "status": "Active",
            "ispInfo": {"renewalDate": "2026-01-01"}
        }))
        .expect("payload");

        assert_eq!(payload.status.as_deref(), Some("Active"));
        assert!(payload.fields.value_at("ispInfo.renewalDate").is_some());
    }
}
