use serde::{Deserialize, Serialize};
use tracing::info;

use crate::audit::AuditSink;
use crate::auth::{Actor, Authorizer, Operation};
use crate::domain::entity::Approvable;
use crate::domain::meta::{EntityId, EntityKind};
use crate::errors::{ApplicationError, DomainError, ErrorClass};
use crate::store::{BusinessIdLookup, EntityStore};

use super::{ApprovalService, Decision, DecisionPayload};

/// One entry of a bulk approve/reject body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDecisionItem {
    pub id: String,
    /// `approved`/`rejected` (or `approve`/`reject`).
    pub request_status: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemFailure {
    pub id: String,
    pub error_class: ErrorClass,
    pub message: String,
}

/// Per-batch counts: `matched` records existed, `modified` were written.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub matched: usize,
    pub modified: usize,
    /// Ids found absent before any item was processed.
    #[serde(default)]
    pub missing: Vec<String>,
    pub failures: Vec<BulkItemFailure>,
}

impl BulkOutcome {
    fn record_missing(&mut self, kind: EntityKind, id: EntityId) {
        self.missing.push(id.to_string());
        self.record(id, Err(ApplicationError::NotFound { kind, id: id.to_string() }));
    }

    fn record(&mut self, id: EntityId, result: Result<(), ApplicationError>) {
        match result {
            Ok(()) => {
                self.matched += 1;
                self.modified += 1;
            }
            Err(error) => {
                if !matches!(error, ApplicationError::NotFound { .. }) {
                    self.matched += 1;
                }
                self.failures.push(BulkItemFailure {
                    id: id.to_string(),
                    error_class: error.class(),
                    message: error.to_string(),
                });
            }
        }
    }
}

/// Parses every id up front; any malformed id fails the whole batch and lists all offenders.
pub fn parse_ids<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<Vec<EntityId>, ApplicationError> {
    let mut ids = Vec::new();
    let mut malformed = Vec::new();
    for candidate in raw {
        match EntityId::parse(candidate) {
            Some(id) => ids.push(id),
            None => malformed.push(candidate.to_string()),
        }
    }
    if !malformed.is_empty() {
        return Err(ApplicationError::MalformedIds(malformed));
    }
    Ok(ids)
}

impl<S, A, Z> ApprovalService<S, A, Z>
where
    S: BusinessIdLookup,
    A: AuditSink,
    Z: Authorizer,
{
    /// Applies `decide` to each item independently; one item's failure never aborts the rest.
    pub async fn bulk_decide<E>(
        &self,
        actor: &Actor,
        items: Vec<BulkDecisionItem>,
    ) -> Result<BulkOutcome, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorize(actor, E::KIND, Operation::Decide)?;
        let ids = parse_ids(items.iter().map(|item| item.id.as_str()))?;

        let mut outcome = BulkOutcome::default();
        let mut present = Vec::with_capacity(ids.len());
        for (id, item) in ids.into_iter().zip(items) {
            if self.exists::<E>(id).await? {
                present.push((id, item));
            } else {
                outcome.record_missing(E::KIND, id);
            }
        }

        for (id, item) in present {
            let result = match Decision::parse(&item.request_status) {
                Some(decision) => {
                    let payload = DecisionPayload { status: item.status, ..DecisionPayload::default() };
                    self.decide::<E>(actor, id, decision, payload).await.map(|_| ())
                }
                None => Err(DomainError::InvariantViolation(format!(
                    "request_status must be approved or rejected, got `{}`",
                    item.request_status
                ))
                .into()),
            };
            outcome.record(id, result);
        }

        info!(
            event_name = "workflow.bulk.decided",
            entity_kind = E::KIND.as_str(),
            actor = %actor.id,
            matched = outcome.matched,
            modified = outcome.modified,
            failed = outcome.failures.len(),
            "bulk decision finished"
        );
        Ok(outcome)
    }

    pub async fn bulk_delete<E>(
        &self,
        actor: &Actor,
        ids: Vec<String>,
    ) -> Result<BulkOutcome, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorize(actor, E::KIND, Operation::Delete)?;
        let ids = parse_ids(ids.iter().map(String::as_str))?;

        let mut outcome = BulkOutcome::default();
        let mut present = Vec::with_capacity(ids.len());
        for id in ids {
            if self.exists::<E>(id).await? {
                present.push(id);
            } else {
                outcome.record_missing(E::KIND, id);
            }
        }

        for id in present {
            let result = self.soft_delete::<E>(actor, id).await.map(|_| ());
            outcome.record(id, result);
        }

        info!(
            event_name = "workflow.bulk.deleted",
            entity_kind = E::KIND.as_str(),
            actor = %actor.id,
            matched = outcome.matched,
            modified = outcome.modified,
            failed = outcome.failures.len(),
            "bulk delete finished"
        );
        Ok(outcome)
    }

    async fn exists<E>(&self, id: EntityId) -> Result<bool, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        let found: Option<E> = self.store().find_by_id(id).await?;
        Ok(found.is_some())
    }
}
