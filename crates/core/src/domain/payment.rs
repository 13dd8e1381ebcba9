use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entity::{Approvable, LifecycleStatus};
use crate::domain::meta::{ApprovalMeta, EntityId, EntityKind};
use crate::domain::value::{FieldKind, TrackedField};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Paid,
    #[default]
    Received,
    Refunding,
    Refunded,
    Rejected,
    Deleted,
    Modified,
}

impl LifecycleStatus for PaymentStatus {
    const ALL: &'static [Self] = &[
        Self::Paid,
        Self::Received,
        Self::Refunding,
        Self::Refunded,
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
            Self::Paid => "Paid",
            Self::Received => "Received",
            Self::Refunding => "Refunding",
            Self::Refunded => "Refunded",
            Self::Rejected => "Rejected",
            Self::Deleted => "Deleted",
            Self::Modified => "Modified",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Expense,
    #[default]
    Income,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(flatten)]
    pub meta: ApprovalMeta,
    pub status: PaymentStatus,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub subscriber_id: Option<EntityId>,
    pub transaction_mode: String,
    pub amount: Decimal,
    pub activation_date: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
}

const TRACKED_FIELDS: &[TrackedField] = &[
    TrackedField::new("transactionMode", FieldKind::Text),
    TrackedField::new("amount", FieldKind::Decimal),
    TrackedField::new("activationDate", FieldKind::Date),
    TrackedField::new("expiryDate", FieldKind::Date),
];

impl Payment {
    /// Income linked to a subscriber with a service window extends that subscriber's renewal.
    pub fn renews_subscription(&self) -> Option<(EntityId, NaiveDate)> {
        match (self.transaction_type, self.subscriber_id, self.expiry_date) {
            (TransactionType::Income, Some(subscriber_id), Some(expiry)) => {
                Some((subscriber_id, expiry))
            }
            _ => None,
        }
    }
}

impl Approvable for Payment {
    type Status = PaymentStatus;

    const KIND: EntityKind = EntityKind::Payment;

    fn tracked_fields() -> &'static [TrackedField] {
        TRACKED_FIELDS
    }

    fn meta(&self) -> &ApprovalMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut ApprovalMeta {
        &mut self.meta
    }

    fn status(&self) -> PaymentStatus {
        self.status
    }

    fn set_status(&mut self, status: PaymentStatus) {
        self.status = status;
    }

    fn initial_status(&self) -> PaymentStatus {
        match self.transaction_type {
            TransactionType::Expense => PaymentStatus::Paid,
            TransactionType::Income => PaymentStatus::Received,
        }
    }

    fn default_approved_status(&self) -> PaymentStatus {
        self.initial_status()
    }

    fn side_transition_allowed(from: PaymentStatus, to: PaymentStatus) -> bool {
        matches!(
            (from, to),
            (PaymentStatus::Paid, PaymentStatus::Refunding)
                | (PaymentStatus::Received, PaymentStatus::Refunding)
                | (PaymentStatus::Refunding, PaymentStatus::Refunded)
        )
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.amount <= Decimal::ZERO {
            return Err(DomainError::InvariantViolation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if self.transaction_mode.trim().is_empty() {
            return Err(DomainError::MissingField { path: "transactionMode".to_string() });
        }
        if let (Some(activation), Some(expiry)) = (self.activation_date, self.expiry_date) {
            if expiry < activation {
                return Err(DomainError::InvariantViolation(
                    "expiryDate must not precede activationDate".to_string(),
                ));
            }
        }
        Ok(())
    }
}
