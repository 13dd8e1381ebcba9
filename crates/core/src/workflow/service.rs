use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::audit::{AuditAction, AuditEvent, AuditOutcome, AuditSink};
use crate::auth::{Actor, Authorizer, Operation};
use crate::config::WorkflowConfig;
use crate::domain::entity::{Approvable, LifecycleStatus};
use crate::domain::meta::{EntityId, EntityKind, RequestStatus};
use crate::domain::payment::Payment;
use crate::domain::subscriber::Subscriber;
use crate::errors::{ApplicationError, ConflictReason, DomainError};
use crate::ids::IdGenerator;
use crate::store::{BusinessIdLookup, EntityFilter, EntityStore, RenewalStore, WriteGuard};

use super::machine::{apply_decision, apply_proposal, apply_side_transition, apply_soft_delete};
use super::{Decision, DecisionPayload, Proposal, ProposalOutcome};

/// Runs the approval workflow against a store.
///
/// Every mutation follows the same order: authorize, load, apply the pure transition, then
/// commit with a guarded write that bumps `version`. Nothing is written when any step fails.
pub struct ApprovalService<S, A, Z> {
    store: S,
    audit: A,
    authorizer: Z,
    ids: IdGenerator,
    settings: WorkflowConfig,
}

impl<S, A, Z> ApprovalService<S, A, Z>
where
    S: BusinessIdLookup,
    A: AuditSink,
    Z: Authorizer,
{
    pub fn new(store: S, audit: A, authorizer: Z, settings: WorkflowConfig) -> Self {
        let ids = IdGenerator::new(settings.id_max_attempts);
        Self { store, audit, authorizer, ids, settings }
    }

    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &WorkflowConfig {
        &self.settings
    }

    pub async fn get<E>(&self, actor: &Actor, id: EntityId) -> Result<E, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorizer.authorize(actor, E::KIND, Operation::Read)?;
        self.load(id).await
    }

    /// Records awaiting a decision, oldest first.
    pub async fn list_pending<E>(&self, actor: &Actor) -> Result<Vec<E>, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorizer.authorize(actor, E::KIND, Operation::Read)?;
        Ok(self.store.list(&EntityFilter::pending()).await?)
    }

    pub async fn create<E>(&self, actor: &Actor, draft: E) -> Result<E, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorizer.authorize(actor, E::KIND, Operation::Create)?;
        let mut entity = self.prepare_draft(actor, draft)?;

        let mut budget = self.ids.budget();
        loop {
            let business_id = self.ids.generate_within(E::KIND, &self.store, &mut budget).await?;
            entity.meta_mut().business_id = business_id;
            match self.store.insert(&entity).await {
                Ok(()) => break,
                Err(error) if error.is_business_id_duplicate() => {
                    warn!(
                        event_name = "ids.insert_race",
                        entity_kind = E::KIND.as_str(),
                        business_id = %entity.meta().business_id,
                        "business id taken between check and insert"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        info!(
            event_name = "workflow.entity.created",
            entity_kind = E::KIND.as_str(),
            entity_id = %entity.meta().id,
            business_id = %entity.meta().business_id,
            actor = %actor.id,
            "entity created pending approval"
        );
        self.audit.emit(AuditEvent::for_entity(
            &entity,
            AuditAction::Create,
            actor.id.clone(),
            AuditOutcome::Success,
        ));
        Ok(entity)
    }

    pub async fn propose<E>(
        &self,
        actor: &Actor,
        id: EntityId,
        proposal: Proposal,
    ) -> Result<E, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorizer.authorize(actor, E::KIND, Operation::Propose)?;
        self.check_remark(proposal.remark.as_deref())?;
        let persisted: E = self.load(id).await?;
        let guard = WriteGuard::at_version(persisted.meta().version);

        let mut entity = persisted.clone();
        let (outcome, snapshots) =
            match apply_proposal(&mut entity, &actor.id, &proposal, Utc::now()) {
                Ok(applied) => applied,
                Err(error) => {
                    self.audit_rejection(&persisted, AuditAction::Propose, actor, &error);
                    return Err(error);
                }
            };

        if !self.commit(&mut entity, guard).await? {
            return Err(stale::<E>(&persisted));
        }

        let changed: Vec<String> =
            snapshots.changed_paths().iter().map(ToString::to_string).collect();
        info!(
            event_name = "workflow.proposal.recorded",
            entity_kind = E::KIND.as_str(),
            entity_id = %entity.meta().id,
            actor = %actor.id,
            auto_approved = outcome == ProposalOutcome::AutoApproved,
            changed_paths = %changed.join(","),
            "proposal recorded"
        );
        self.audit.emit(
            AuditEvent::for_entity(&entity, AuditAction::Propose, actor.id.clone(), AuditOutcome::Success)
                .with_changes(envelope_changes(&entity))
                .with_metadata("request_status", entity.meta().request_status.as_str())
                .with_metadata("status", entity.status().as_str()),
        );
        Ok(entity)
    }

    pub async fn decide<E>(
        &self,
        actor: &Actor,
        id: EntityId,
        decision: Decision,
        payload: DecisionPayload,
    ) -> Result<E, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorizer.authorize(actor, E::KIND, Operation::Decide)?;
        self.check_remark(payload.remark.as_deref())?;
        let persisted: E = self.load(id).await?;
        let guard = WriteGuard::pending_at(persisted.meta().version);
        let action = match decision {
            Decision::Approve => AuditAction::Approve,
            Decision::Reject => AuditAction::Reject,
        };

        let mut entity = persisted.clone();
        if let Err(error) = apply_decision(&mut entity, &actor.id, decision, &payload, Utc::now()) {
            self.audit_rejection(&persisted, action, actor, &error);
            return Err(error);
        }

        if !self.commit(&mut entity, guard).await? {
            let error = self.lost_race::<E>(id, &persisted).await;
            self.audit_rejection(&persisted, action, actor, &error);
            return Err(error);
        }

        info!(
            event_name = "workflow.decision.applied",
            entity_kind = E::KIND.as_str(),
            entity_id = %entity.meta().id,
            actor = %actor.id,
            decision = %decision,
            status = entity.status().as_str(),
            "decision applied"
        );
        self.audit.emit(
            AuditEvent::for_entity(&entity, action, actor.id.clone(), AuditOutcome::Success)
                .with_changes(envelope_changes(&entity))
                .with_metadata("status", entity.status().as_str()),
        );
        Ok(entity)
    }

    pub async fn side_transition<E>(
        &self,
        actor: &Actor,
        id: EntityId,
        target: &str,
        payload: DecisionPayload,
    ) -> Result<E, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorizer.authorize(actor, E::KIND, Operation::SideTransition)?;
        self.check_remark(payload.remark.as_deref())?;
        let persisted: E = self.load(id).await?;
        let guard = WriteGuard::at_version(persisted.meta().version);

        let mut entity = persisted.clone();
        if let Err(error) = apply_side_transition(&mut entity, &actor.id, target, &payload, Utc::now())
        {
            self.audit_rejection(&persisted, AuditAction::SideTransition, actor, &error);
            return Err(error);
        }
        if !self.commit(&mut entity, guard).await? {
            return Err(stale::<E>(&persisted));
        }

        info!(
            event_name = "workflow.status.changed",
            entity_kind = E::KIND.as_str(),
            entity_id = %entity.meta().id,
            actor = %actor.id,
            from = persisted.status().as_str(),
            to = entity.status().as_str(),
            "side transition applied"
        );
        self.audit.emit(
            AuditEvent::for_entity(
                &entity,
                AuditAction::SideTransition,
                actor.id.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("from", persisted.status().as_str())
            .with_metadata("to", entity.status().as_str()),
        );
        Ok(entity)
    }

    pub async fn soft_delete<E>(&self, actor: &Actor, id: EntityId) -> Result<E, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.authorizer.authorize(actor, E::KIND, Operation::Delete)?;
        let persisted: E = self.load(id).await?;
        let guard = WriteGuard::at_version(persisted.meta().version);

        let mut entity = persisted.clone();
        if let Err(error) = apply_soft_delete(&mut entity, &actor.id, Utc::now()) {
            self.audit_rejection(&persisted, AuditAction::Delete, actor, &error);
            return Err(error);
        }
        if !self.commit(&mut entity, guard).await? {
            return Err(self.lost_race::<E>(id, &persisted).await);
        }

        info!(
            event_name = "workflow.entity.deleted",
            entity_kind = E::KIND.as_str(),
            entity_id = %entity.meta().id,
            actor = %actor.id,
            "entity soft-deleted"
        );
        self.audit.emit(AuditEvent::for_entity(
            &entity,
            AuditAction::Delete,
            actor.id.clone(),
            AuditOutcome::Success,
        ));
        Ok(entity)
    }

    /// Creates a payment. Income linked to a subscriber also moves that subscriber's
    /// renewal window, in the same atomic write.
    pub async fn record_payment(
        &self,
        actor: &Actor,
        draft: Payment,
    ) -> Result<Payment, ApplicationError>
    where
        S: RenewalStore,
    {
        let Some((subscriber_id, expiry)) = draft.renews_subscription() else {
            return self.create(actor, draft).await;
        };

        self.authorizer.authorize(actor, EntityKind::Payment, Operation::Create)?;
        let mut payment = self.prepare_draft(actor, draft)?;
        let persisted: Subscriber = self.load(subscriber_id).await?;
        if persisted.meta.is_deleted {
            return Err(ApplicationError::AlreadyProcessed {
                kind: EntityKind::Subscriber,
                id: persisted.meta.business_id.to_string(),
                state: "deleted".to_string(),
            });
        }

        let guard = WriteGuard::at_version(persisted.meta.version);
        let mut subscriber = persisted.clone();
        subscriber.isp_info.renewal_date = Some(expiry);
        if let Some(activation) = payment.activation_date {
            subscriber.isp_info.current_activation_date = Some(activation);
        }
        subscriber.meta.version = guard.version + 1;
        subscriber.meta.updated_at = payment.meta.created_at;

        let mut budget = self.ids.budget();
        loop {
            payment.meta.business_id =
                self.ids.generate_within(EntityKind::Payment, &self.store, &mut budget).await?;
            match self.store.insert_payment_with_renewal(&payment, &subscriber, guard).await {
                Ok(true) => break,
                Ok(false) => return Err(stale::<Subscriber>(&persisted)),
                Err(error) if error.is_business_id_duplicate() => {
                    warn!(
                        event_name = "ids.insert_race",
                        entity_kind = EntityKind::Payment.as_str(),
                        business_id = %payment.meta.business_id,
                        "business id taken between check and insert"
                    );
                }
                Err(error) => return Err(error.into()),
            }
        }

        info!(
            event_name = "workflow.payment.renewed",
            entity_id = %payment.meta.id,
            subscriber_id = %subscriber.meta.id,
            renewal_date = %expiry,
            actor = %actor.id,
            "payment recorded with subscriber renewal"
        );
        self.audit.emit(AuditEvent::for_entity(
            &payment,
            AuditAction::Create,
            actor.id.clone(),
            AuditOutcome::Success,
        ));
        self.audit.emit(
            AuditEvent::for_entity(
                &subscriber,
                AuditAction::SideTransition,
                actor.id.clone(),
                AuditOutcome::Success,
            )
            .with_metadata("renewal_date", expiry.to_string())
            .with_metadata("payment", payment.meta.business_id.to_string()),
        );
        Ok(payment)
    }

    fn prepare_draft<E: Approvable>(&self, actor: &Actor, mut draft: E) -> Result<E, ApplicationError> {
        self.check_remark(draft.meta().remark.as_deref())?;
        draft.validate()?;

        let now = Utc::now();
        let status = draft.initial_status();
        draft.set_status(status);
        let meta = draft.meta_mut();
        meta.id = EntityId::new();
        meta.request_status = RequestStatus::Pending;
        meta.modified_data = None;
        meta.created_by = actor.id.clone();
        meta.decision_by = None;
        meta.deleted_by = None;
        meta.is_deleted = false;
        meta.version = 0;
        meta.created_at = now;
        meta.updated_at = now;
        Ok(draft)
    }

    pub(crate) fn authorize(
        &self,
        actor: &Actor,
        kind: EntityKind,
        operation: Operation,
    ) -> Result<(), ApplicationError> {
        self.authorizer.authorize(actor, kind, operation)
    }

    pub(crate) async fn load<E>(&self, id: EntityId) -> Result<E, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound { kind: E::KIND, id: id.to_string() })
    }

    async fn commit<E>(&self, entity: &mut E, guard: WriteGuard) -> Result<bool, ApplicationError>
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        entity.meta_mut().version = guard.version + 1;
        Ok(self.store.update_guarded(&*entity, guard).await?)
    }

    /// Explains a guarded write that matched nothing by re-reading the record.
    async fn lost_race<E>(&self, id: EntityId, persisted: &E) -> ApplicationError
    where
        E: Approvable,
        S: EntityStore<E>,
    {
        let current: E = match self.load(id).await {
            Ok(current) => current,
            Err(error) => return error,
        };
        let meta = current.meta();
        if meta.is_deleted {
            return ApplicationError::AlreadyProcessed {
                kind: E::KIND,
                id: meta.business_id.to_string(),
                state: "deleted".to_string(),
            };
        }
        if meta.request_status != RequestStatus::Pending {
            return ApplicationError::AlreadyProcessed {
                kind: E::KIND,
                id: meta.business_id.to_string(),
                state: meta.request_status.as_str().to_string(),
            };
        }
        stale::<E>(persisted)
    }

    fn check_remark(&self, remark: Option<&str>) -> Result<(), DomainError> {
        let Some(remark) = remark else {
            return Ok(());
        };
        let length = remark.chars().count();
        if length > self.settings.remark_max_chars {
            return Err(DomainError::RemarkTooLong { length, max: self.settings.remark_max_chars });
        }
        Ok(())
    }

    fn audit_rejection<E: Approvable>(
        &self,
        entity: &E,
        action: AuditAction,
        actor: &Actor,
        error: &ApplicationError,
    ) {
        warn!(
            event_name = "workflow.request.rejected",
            entity_kind = E::KIND.as_str(),
            entity_id = %entity.meta().id,
            actor = %actor.id,
            action = action.as_str(),
            error_class = error.class().as_str(),
            error = %error,
            "workflow request refused"
        );
        self.audit.emit(
            AuditEvent::for_entity(entity, action, actor.id.clone(), AuditOutcome::Rejected)
                .with_metadata("error_class", error.class().as_str())
                .with_metadata("reason", error.to_string()),
        );
    }
}

fn stale<E: Approvable>(entity: &E) -> ApplicationError {
    ApplicationError::Conflict {
        kind: E::KIND,
        id: entity.meta().business_id.to_string(),
        reason: ConflictReason::StaleWrite,
    }
}

fn envelope_changes<E: Approvable>(entity: &E) -> Value {
    match &entity.meta().modified_data {
        Some(envelope) => json!({
            "previous": envelope.previous.to_nested_json(),
            "current": envelope.current.to_nested_json(),
        }),
        None => Value::Null,
    }
}
