use chrono::{DateTime, Utc};

use crate::domain::entity::{Approvable, LifecycleStatus};
use crate::domain::meta::{ActorRef, ModifiedData, RequestStatus};
use crate::domain::value::{find_tracked, ChangeSet, TrackedField};
use crate::errors::{ApplicationError, ConflictReason, DomainError};
use crate::tracker::{build_snapshots, merge_change_set, Snapshots};

use super::{Decision, DecisionPayload, Proposal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalOutcome {
    /// Tracked values changed; the record waits for a decision.
    Pending,
    /// Nothing tracked changed; the proposal settled immediately.
    AutoApproved,
}

/// Records `proposal` on `entity` and returns how it settled along with its snapshots.
pub fn apply_proposal<E: Approvable>(
    entity: &mut E,
    actor: &ActorRef,
    proposal: &Proposal,
    now: DateTime<Utc>,
) -> Result<(ProposalOutcome, Snapshots), ApplicationError> {
    ensure_not_deleted(entity)?;
    if entity.meta().has_pending_edit() {
        return Err(conflict(entity, ConflictReason::ProposalPending));
    }
    if proposal.expected_version.is_some_and(|expected| expected != entity.meta().version) {
        return Err(conflict(entity, ConflictReason::StaleWrite));
    }

    let snapshots = build_snapshots(entity, &proposal.fields)?;
    merge_change_set(entity, &snapshots.current)?.validate()?;

    // An edit folded into a creation request has no settled status to return to.
    let creation_pending = entity.meta().request_status == RequestStatus::Pending;
    let prior_status = (!creation_pending).then(|| entity.status().as_str().to_string());
    let outcome =
        if snapshots.is_noop() { ProposalOutcome::AutoApproved } else { ProposalOutcome::Pending };

    let meta = entity.meta_mut();
    meta.modified_data = Some(ModifiedData {
        previous: snapshots.previous.clone(),
        current: snapshots.current.clone(),
        prior_status,
        modified_by: actor.clone(),
        modified_at: now,
    });
    if let Some(remark) = &proposal.remark {
        meta.remark = Some(remark.clone());
    }
    meta.updated_at = now;

    match outcome {
        ProposalOutcome::AutoApproved => {
            entity.meta_mut().request_status = RequestStatus::Approved;
        }
        ProposalOutcome::Pending => {
            entity.meta_mut().request_status = RequestStatus::Pending;
            entity.set_status(E::Status::modified());
        }
    }
    Ok((outcome, snapshots))
}

/// Settles the pending request on `entity`.
///
/// Approval merges the envelope's `current` values, then the payload's decision fields.
/// Rejection leaves every field as persisted and returns the record to its prior status.
pub fn apply_decision<E: Approvable>(
    entity: &mut E,
    actor: &ActorRef,
    decision: Decision,
    payload: &DecisionPayload,
    now: DateTime<Utc>,
) -> Result<(), ApplicationError> {
    ensure_not_deleted(entity)?;
    let request_status = entity.meta().request_status;
    if request_status != RequestStatus::Pending {
        return Err(ApplicationError::AlreadyProcessed {
            kind: E::KIND,
            id: entity.meta().business_id.to_string(),
            state: request_status.as_str().to_string(),
        });
    }
    ensure_fields_allowed(&payload.fields, E::decision_fields())?;

    let envelope = entity.meta().modified_data.clone();
    let prior_status = envelope
        .as_ref()
        .and_then(|envelope| envelope.prior_status.as_deref())
        .map(|raw| parse_status::<E>(raw))
        .transpose()?;
    let requested = payload.status.as_deref().map(parse_status::<E>).transpose()?;

    let mut settled = match decision {
        Decision::Approve => {
            let current = entity.status();
            if !E::approvable_from(current) {
                return Err(DomainError::IneligibleStatus {
                    kind: E::KIND,
                    status: current.as_str().to_string(),
                }
                .into());
            }

            let mut merged = match &envelope {
                Some(envelope) => merge_change_set(entity, &envelope.current)?,
                None => entity.clone(),
            };
            merged = merge_change_set(&merged, &payload.fields)?;
            if current == E::Status::modified() {
                merged.preserve_on_approval(entity);
            }

            let target = requested
                .or(prior_status)
                .unwrap_or_else(|| merged.default_approved_status());
            ensure_settled_target::<E>(current, target)?;
            merged.validate()?;
            merged.set_status(target);
            merged
        }
        Decision::Reject => {
            let current = entity.status();
            let target = requested.or(prior_status).unwrap_or_else(E::Status::rejected);
            ensure_settled_target::<E>(current, target)?;
            let mut kept = entity.clone();
            kept.set_status(target);
            kept
        }
    };

    let meta = settled.meta_mut();
    meta.request_status = decision.request_status();
    meta.decision_by = Some(actor.clone());
    if let Some(remark) = &payload.remark {
        meta.remark = Some(remark.clone());
    }
    meta.updated_at = now;

    *entity = settled;
    Ok(())
}

/// Operational status change outside the proposal workflow. `request_status` is untouched.
pub fn apply_side_transition<E: Approvable>(
    entity: &mut E,
    actor: &ActorRef,
    target: &str,
    payload: &DecisionPayload,
    now: DateTime<Utc>,
) -> Result<(), ApplicationError> {
    ensure_not_deleted(entity)?;
    ensure_fields_allowed(&payload.fields, E::decision_fields())?;

    let current = entity.status();
    let target = parse_status::<E>(target)?;
    // A pending edit parks the settled status in its envelope; the transition moves that one.
    let parked = parked_status(entity)?;
    let source = parked.unwrap_or(current);
    if target == E::Status::modified()
        || target == E::Status::deleted()
        || !E::side_transition_allowed(source, target)
    {
        return Err(invalid_transition::<E>(source, target).into());
    }

    let mut updated = merge_change_set(entity, &payload.fields)?;
    updated.validate()?;
    match updated.meta_mut().modified_data.as_mut().filter(|_| parked.is_some()) {
        Some(envelope) => envelope.prior_status = Some(target.as_str().to_string()),
        None => updated.set_status(target),
    }

    let meta = updated.meta_mut();
    meta.decision_by = Some(actor.clone());
    if let Some(remark) = &payload.remark {
        meta.remark = Some(remark.clone());
    }
    meta.updated_at = now;

    *entity = updated;
    Ok(())
}

/// Terminal soft delete; allowed whatever the request status.
pub fn apply_soft_delete<E: Approvable>(
    entity: &mut E,
    actor: &ActorRef,
    now: DateTime<Utc>,
) -> Result<(), ApplicationError> {
    ensure_not_deleted(entity)?;
    entity.set_status(E::Status::deleted());
    let meta = entity.meta_mut();
    meta.is_deleted = true;
    meta.deleted_by = Some(actor.clone());
    meta.updated_at = now;
    Ok(())
}

pub fn parse_status<E: Approvable>(raw: &str) -> Result<E::Status, DomainError> {
    E::Status::parse(raw)
        .ok_or_else(|| DomainError::UnknownStatus { kind: E::KIND, value: raw.to_string() })
}

/// The status a `Modified` record returns to once its pending edit settles.
fn parked_status<E: Approvable>(entity: &E) -> Result<Option<E::Status>, DomainError> {
    if entity.status() != E::Status::modified() || !entity.meta().has_pending_edit() {
        return Ok(None);
    }
    entity
        .meta()
        .modified_data
        .as_ref()
        .and_then(|envelope| envelope.prior_status.as_deref())
        .map(parse_status::<E>)
        .transpose()
}

fn ensure_not_deleted<E: Approvable>(entity: &E) -> Result<(), ApplicationError> {
    if entity.meta().is_deleted {
        return Err(ApplicationError::AlreadyProcessed {
            kind: E::KIND,
            id: entity.meta().business_id.to_string(),
            state: "deleted".to_string(),
        });
    }
    Ok(())
}

fn ensure_fields_allowed(fields: &ChangeSet, allowed: &[TrackedField]) -> Result<(), DomainError> {
    match fields.paths().find(|path| find_tracked(allowed, path).is_none()) {
        Some(path) => Err(DomainError::UntrackedField { path: path.to_string() }),
        None => Ok(()),
    }
}

/// A decision must land on a settled status.
fn ensure_settled_target<E: Approvable>(
    current: E::Status,
    target: E::Status,
) -> Result<(), DomainError> {
    if target == E::Status::modified() || target == E::Status::deleted() {
        return Err(invalid_transition::<E>(current, target));
    }
    Ok(())
}

fn invalid_transition<E: Approvable>(from: E::Status, to: E::Status) -> DomainError {
    DomainError::InvalidTransition {
        kind: E::KIND,
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    }
}

fn conflict<E: Approvable>(entity: &E, reason: ConflictReason) -> ApplicationError {
    ApplicationError::Conflict { kind: E::KIND, id: entity.meta().business_id.to_string(), reason }
}
