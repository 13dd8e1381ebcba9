use std::collections::HashSet;

use chrono::NaiveDate;
use fieldops_core::audit::{AuditAction, AuditOutcome, InMemoryAuditSink};
use fieldops_core::auth::{Actor, Role, RoleAuthorizer};
use fieldops_core::config::WorkflowConfig;
use fieldops_core::domain::employee::Employee;
use fieldops_core::domain::meta::{EntityId, EntityKind, RequestStatus};
use fieldops_core::domain::payment::{Payment, PaymentStatus, TransactionType};
use fieldops_core::domain::subscriber::{IspInfo, Subscriber, SubscriberStatus};
use fieldops_core::domain::ticket::{Ticket, TicketStatus};
use fieldops_core::domain::value::{ChangeSet, FieldValue};
use fieldops_core::errors::{ApplicationError, ConflictReason, DomainError, ErrorClass};
use fieldops_core::ids::{IdGenerator, ScriptedSuffix};
use fieldops_core::domain::entity::Approvable;
use fieldops_core::store::{
    BusinessIdLookup, EntityFilter, EntityStore, InMemoryEntityStore, StoreError, WriteGuard,
};
use fieldops_core::workflow::{
    ApprovalService, BulkDecisionItem, Decision, DecisionPayload, Proposal,
};
use rust_decimal::Decimal;

type Service = ApprovalService<InMemoryEntityStore, InMemoryAuditSink, RoleAuthorizer>;

struct Harness {
    service: Service,
    audit: InMemoryAuditSink,
}

fn harness() -> Harness {
    let audit = InMemoryAuditSink::default();
    let service = ApprovalService::new(
        InMemoryEntityStore::new(),
        audit.clone(),
        RoleAuthorizer,
        WorkflowConfig::default(),
    );
    Harness { service, audit }
}

fn harness_with_suffixes(suffixes: &[&str]) -> Harness {
    let Harness { service, audit } = harness();
    let ids = IdGenerator::with_source(ScriptedSuffix::new(suffixes.iter().copied()), 5);
    Harness { service: service.with_id_generator(ids), audit }
}

fn manager() -> Actor {
    Actor::new("emp-manager", [Role::Manager])
}

fn staff() -> Actor {
    Actor::new("emp-staff", [Role::Staff])
}

fn admin() -> Actor {
    Actor::new("emp-admin", [Role::Admin])
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn subscriber_draft(site_code: &str) -> Subscriber {
    Subscriber {
        customer_name: "Asha Traders".to_string(),
        site_name: "Koramangala".to_string(),
        site_code: site_code.to_string(),
        isp_info: IspInfo {
            name: "FiberNet".to_string(),
            mrc: Some(Decimal::new(500, 0)),
            activation_date: Some(date(2024, 1, 1)),
            renewal_date: Some(date(2025, 1, 1)),
            ..IspInfo::default()
        },
        ..Subscriber::default()
    }
}

async fn active_subscriber(harness: &Harness, site_code: &str) -> Subscriber {
    let created: Subscriber =
        harness.service.create(&staff(), subscriber_draft(site_code)).await.expect("create");
    harness
        .service
        .decide(&manager(), created.meta.id, Decision::Approve, DecisionPayload::with_status("Active"))
        .await
        .expect("approve")
}

fn mrc(amount: i64) -> ChangeSet {
    ChangeSet::new().with("ispInfo.mrc", Decimal::new(amount, 0)).expect("changes")
}

#[tokio::test]
async fn created_subscriber_is_approved_into_the_requested_status() {
    let harness = harness();

    let created: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-1")).await.expect("create");
    assert_eq!(created.status, SubscriberStatus::Added);
    assert_eq!(created.meta.request_status, RequestStatus::Pending);
    assert!(created.meta.business_id.0.starts_with("SUB-"));
    assert_eq!(created.meta.version, 0);

    let approved: Subscriber = harness
        .service
        .decide(&manager(), created.meta.id, Decision::Approve, DecisionPayload::with_status("Active"))
        .await
        .expect("approve");

    assert_eq!(approved.status, SubscriberStatus::Active);
    assert_eq!(approved.meta.request_status, RequestStatus::Approved);
    assert_eq!(approved.meta.decision_by.as_ref().map(|actor| actor.as_str()), Some("emp-manager"));
    assert_eq!(approved.isp_info.renewal_date, Some(date(2025, 1, 1)));
    assert_eq!(approved.meta.version, 1);

    let actions: Vec<AuditAction> = harness.audit.events().iter().map(|event| event.action).collect();
    assert_eq!(actions, vec![AuditAction::Create, AuditAction::Approve]);
}

#[tokio::test]
async fn remark_only_proposal_settles_without_a_decision() {
    let harness = harness();
    let created: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-1")).await.expect("create");

    let proposed: Subscriber = harness
        .service
        .propose(&staff(), created.meta.id, Proposal::default().with_remark("called the site"))
        .await
        .expect("proposal");

    assert_eq!(proposed.meta.request_status, RequestStatus::Approved);
    assert_eq!(proposed.status, SubscriberStatus::Added);
    assert_eq!(proposed.meta.remark.as_deref(), Some("called the site"));
}

#[tokio::test]
async fn unchanged_tracked_values_settle_immediately() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;

    let proposed: Subscriber = harness
        .service
        .propose(&staff(), active.meta.id, Proposal::new(mrc(500)))
        .await
        .expect("proposal");

    assert_eq!(proposed.meta.request_status, RequestStatus::Approved);
    assert_eq!(proposed.status, SubscriberStatus::Active);
}

#[tokio::test]
async fn changed_tracked_value_waits_for_approval_with_both_snapshots() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;

    let proposed: Subscriber = harness
        .service
        .propose(&staff(), active.meta.id, Proposal::new(mrc(600)))
        .await
        .expect("proposal");

    assert_eq!(proposed.status, SubscriberStatus::Modified);
    assert_eq!(proposed.meta.request_status, RequestStatus::Pending);
    assert_eq!(proposed.isp_info.mrc, Some(Decimal::new(500, 0)));
    let envelope = proposed.meta.modified_data.as_ref().expect("envelope");
    assert_eq!(
        envelope.previous.value_at("ispInfo.mrc"),
        Some(&FieldValue::Decimal(Decimal::new(500, 0)))
    );
    assert_eq!(
        envelope.current.value_at("ispInfo.mrc"),
        Some(&FieldValue::Decimal(Decimal::new(600, 0)))
    );
    let previous: Vec<String> = envelope.previous.paths().map(ToString::to_string).collect();
    let current: Vec<String> = envelope.current.paths().map(ToString::to_string).collect();
    assert_eq!(previous, current);

    let pending: Vec<Subscriber> =
        harness.service.list_pending(&manager()).await.expect("pending list");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].meta.id, active.meta.id);

    let approved: Subscriber = harness
        .service
        .decide(&manager(), active.meta.id, Decision::Approve, DecisionPayload::default())
        .await
        .expect("approve");
    assert_eq!(approved.status, SubscriberStatus::Active);
    assert_eq!(approved.isp_info.mrc, Some(Decimal::new(600, 0)));
    assert_eq!(approved.isp_info.renewal_date, Some(date(2025, 1, 1)));
}

#[tokio::test]
async fn rejected_edit_restores_prior_status_and_values() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;
    harness
        .service
        .propose::<Subscriber>(&staff(), active.meta.id, Proposal::new(mrc(600)))
        .await
        .expect("proposal");

    let rejected: Subscriber = harness
        .service
        .decide(
            &manager(),
            active.meta.id,
            Decision::Reject,
            DecisionPayload::default().with_remark("plan not approved"),
        )
        .await
        .expect("reject");

    assert_eq!(rejected.status, SubscriberStatus::Active);
    assert_eq!(rejected.meta.request_status, RequestStatus::Rejected);
    assert_eq!(rejected.isp_info.mrc, Some(Decimal::new(500, 0)));
    assert_eq!(rejected.meta.remark.as_deref(), Some("plan not approved"));
}

#[tokio::test]
async fn second_decision_is_already_processed_and_changes_nothing() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;

    let error = harness
        .service
        .decide::<Subscriber>(&manager(), active.meta.id, Decision::Approve, DecisionPayload::default())
        .await
        .expect_err("second approval");

    assert!(matches!(error, ApplicationError::AlreadyProcessed { ref state, .. } if state == "approved"));
    let persisted: Subscriber =
        harness.service.get(&manager(), active.meta.id).await.expect("reload");
    assert_eq!(persisted, active);

    let last = harness.audit.events().pop().expect("rejection audit");
    assert_eq!(last.action, AuditAction::Approve);
    assert_eq!(last.outcome, AuditOutcome::Rejected);
    assert_eq!(last.metadata.get("error_class").map(String::as_str), Some("already_processed"));
}

#[tokio::test]
async fn second_proposal_while_pending_conflicts() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;
    harness
        .service
        .propose::<Subscriber>(&staff(), active.meta.id, Proposal::new(mrc(600)))
        .await
        .expect("first proposal");

    let error = harness
        .service
        .propose::<Subscriber>(&staff(), active.meta.id, Proposal::new(mrc(700)))
        .await
        .expect_err("second proposal");

    assert!(matches!(
        error,
        ApplicationError::Conflict { reason: ConflictReason::ProposalPending, .. }
    ));
}

#[tokio::test]
async fn proposal_against_an_old_version_is_stale() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;

    let error = harness
        .service
        .propose::<Subscriber>(
            &staff(),
            active.meta.id,
            Proposal::new(mrc(600)).expecting_version(active.meta.version + 3),
        )
        .await
        .expect_err("stale proposal");

    assert!(matches!(error, ApplicationError::Conflict { reason: ConflictReason::StaleWrite, .. }));
    assert_eq!(error.class(), ErrorClass::Conflict);
}

#[tokio::test]
async fn untracked_proposal_field_is_a_validation_failure() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;
    let changes = ChangeSet::new().with("ispInfo.renewalDate", date(2026, 1, 1)).expect("changes");

    let error = harness
        .service
        .propose::<Subscriber>(&staff(), active.meta.id, Proposal::new(changes))
        .await
        .expect_err("untracked field");

    assert!(matches!(error, ApplicationError::Domain(DomainError::UntrackedField { .. })));
    assert_eq!(error.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn overlong_remark_is_refused_before_loading() {
    let harness = harness();
    let remark = "x".repeat(WorkflowConfig::default().remark_max_chars + 1);

    let error = harness
        .service
        .propose::<Subscriber>(&staff(), EntityId::new(), Proposal::default().with_remark(remark))
        .await
        .expect_err("remark too long");

    assert!(matches!(error, ApplicationError::Domain(DomainError::RemarkTooLong { .. })));
}

#[tokio::test]
async fn decisions_require_an_approver_role() {
    let harness = harness();
    let created: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-1")).await.expect("create");

    let forbidden = harness
        .service
        .decide::<Subscriber>(&staff(), created.meta.id, Decision::Approve, DecisionPayload::default())
        .await
        .expect_err("staff cannot approve");
    assert_eq!(forbidden.class(), ErrorClass::Forbidden);

    let anonymous = harness
        .service
        .create(&Actor::new("", [Role::Admin]), subscriber_draft("BLR-2"))
        .await
        .expect_err("anonymous create");
    assert_eq!(anonymous, ApplicationError::Unauthorized);

    let persisted: Subscriber =
        harness.service.get(&staff(), created.meta.id).await.expect("reload");
    assert_eq!(persisted.meta.request_status, RequestStatus::Pending);
}

#[tokio::test]
async fn soft_deleted_record_stays_retrievable() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;

    let deleted: Subscriber =
        harness.service.soft_delete(&admin(), active.meta.id).await.expect("delete");
    assert!(deleted.meta.is_deleted);
    assert_eq!(deleted.status, SubscriberStatus::Deleted);
    assert_eq!(deleted.meta.deleted_by.as_ref().map(|actor| actor.as_str()), Some("emp-admin"));

    let reloaded: Subscriber =
        harness.service.get(&manager(), active.meta.id).await.expect("reload");
    assert!(reloaded.meta.is_deleted);

    let again = harness
        .service
        .soft_delete::<Subscriber>(&admin(), active.meta.id)
        .await
        .expect_err("already deleted");
    assert!(matches!(again, ApplicationError::AlreadyProcessed { .. }));

    let proposal = harness
        .service
        .propose::<Subscriber>(&staff(), active.meta.id, Proposal::new(mrc(600)))
        .await
        .expect_err("deleted records take no proposals");
    assert!(matches!(proposal, ApplicationError::AlreadyProcessed { .. }));
}

#[tokio::test]
async fn side_transitions_follow_the_operational_graph() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;

    let suspended: Subscriber = harness
        .service
        .side_transition(&manager(), active.meta.id, "Suspended", DecisionPayload::default())
        .await
        .expect("suspend");
    assert_eq!(suspended.status, SubscriberStatus::Suspended);
    assert_eq!(suspended.meta.request_status, RequestStatus::Approved);

    let error = harness
        .service
        .side_transition::<Subscriber>(&manager(), active.meta.id, "Added", DecisionPayload::default())
        .await
        .expect_err("no way back to Added");
    assert!(matches!(error, ApplicationError::Domain(DomainError::InvalidTransition { .. })));

    let unknown = harness
        .service
        .side_transition::<Subscriber>(&manager(), active.meta.id, "Frozen", DecisionPayload::default())
        .await
        .expect_err("unknown status");
    assert!(matches!(unknown, ApplicationError::Domain(DomainError::UnknownStatus { .. })));
}

#[tokio::test]
async fn rejected_ticket_creation_is_canceled() {
    let harness = harness();
    let draft = Ticket {
        title: "Link down".to_string(),
        priority: "high".to_string(),
        ..Ticket::default()
    };
    let created: Ticket = harness.service.create(&staff(), draft).await.expect("create");
    assert_eq!(created.status, TicketStatus::Open);
    assert!(created.meta.business_id.0.starts_with("TKT-"));

    let rejected: Ticket = harness
        .service
        .decide(&manager(), created.meta.id, Decision::Reject, DecisionPayload::default())
        .await
        .expect("reject");

    assert_eq!(rejected.status, TicketStatus::Canceled);
    assert_eq!(rejected.meta.request_status, RequestStatus::Rejected);
}

#[tokio::test]
async fn colliding_business_id_is_redrawn() {
    let harness = harness_with_suffixes(&["12345", "12345", "67890"]);

    let first: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-1")).await.expect("first");
    let second: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-2")).await.expect("second");

    assert_eq!(first.meta.business_id.0, "SUB-12345");
    assert_eq!(second.meta.business_id.0, "SUB-67890");
}

#[tokio::test]
async fn exhausted_business_ids_fail_the_create() {
    let harness = harness_with_suffixes(&["00001", "00001", "00001", "00001", "00001", "00001"]);
    harness.service.create::<Subscriber>(&staff(), subscriber_draft("BLR-1")).await.expect("first");

    let error = harness
        .service
        .create::<Subscriber>(&staff(), subscriber_draft("BLR-2"))
        .await
        .expect_err("exhausted");

    assert!(matches!(error, ApplicationError::GenerationExhausted { attempts: 5, .. }));
    assert_eq!(error.class(), ErrorClass::Internal);
}

#[tokio::test]
async fn sequential_business_ids_are_distinct() {
    let harness = harness();
    let mut seen = HashSet::new();

    for index in 0..20 {
        let draft = Employee {
            name: format!("Tech {index}"),
            email: format!("tech{index}@example.com"),
            ..Employee::default()
        };
        let created: Employee = harness.service.create(&staff(), draft).await.expect("create");
        assert!(seen.insert(created.meta.business_id.0.clone()));
    }

    assert_eq!(harness.service.store().len(EntityKind::Employee).await, 20);
}

#[tokio::test]
async fn duplicate_unique_key_is_refused() {
    let harness = harness();
    active_subscriber(&harness, "BLR-1").await;

    let error = harness
        .service
        .create::<Subscriber>(&staff(), subscriber_draft("blr-1 "))
        .await
        .expect_err("site code taken");

    assert_eq!(error.class(), ErrorClass::Conflict);
}

#[tokio::test]
async fn income_payment_extends_the_subscriber_renewal() {
    let harness = harness();
    let active = active_subscriber(&harness, "BLR-1").await;
    let draft = Payment {
        transaction_type: TransactionType::Income,
        subscriber_id: Some(active.meta.id),
        transaction_mode: "upi".to_string(),
        amount: Decimal::new(6000, 0),
        activation_date: Some(date(2025, 1, 1)),
        expiry_date: Some(date(2026, 1, 1)),
        ..Payment::default()
    };

    let payment = harness.service.record_payment(&manager(), draft).await.expect("payment");
    assert_eq!(payment.status, PaymentStatus::Received);
    assert!(payment.meta.business_id.0.starts_with("TR-"));

    let renewed: Subscriber =
        harness.service.get(&manager(), active.meta.id).await.expect("reload");
    assert_eq!(renewed.isp_info.renewal_date, Some(date(2026, 1, 1)));
    assert_eq!(renewed.isp_info.current_activation_date, Some(date(2025, 1, 1)));
    assert_eq!(renewed.meta.version, active.meta.version + 1);

    let stored: Option<Payment> =
        EntityStore::<Payment>::find_by_id(harness.service.store(), payment.meta.id)
            .await
            .expect("find payment");
    assert!(stored.is_some());
}

#[tokio::test]
async fn expense_payment_is_paid_and_touches_no_subscriber() {
    let harness = harness();
    let draft = Payment {
        transaction_type: TransactionType::Expense,
        transaction_mode: "cash".to_string(),
        amount: Decimal::new(1200, 0),
        ..Payment::default()
    };

    let payment = harness.service.record_payment(&manager(), draft).await.expect("payment");

    assert_eq!(payment.status, PaymentStatus::Paid);
    assert_eq!(harness.service.store().len(EntityKind::Subscriber).await, 0);
}

#[tokio::test]
async fn bulk_decide_reports_each_item() {
    let harness = harness();
    let pending: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-1")).await.expect("create");
    let settled = active_subscriber(&harness, "BLR-2").await;
    let missing = EntityId::new();

    let outcome = harness
        .service
        .bulk_decide::<Subscriber>(
            &manager(),
            vec![
                BulkDecisionItem {
                    id: pending.meta.id.to_string(),
                    request_status: "approved".to_string(),
                    status: Some("Active".to_string()),
                },
                BulkDecisionItem {
                    id: settled.meta.id.to_string(),
                    request_status: "approved".to_string(),
                    status: None,
                },
                BulkDecisionItem {
                    id: missing.to_string(),
                    request_status: "rejected".to_string(),
                    status: None,
                },
            ],
        )
        .await
        .expect("bulk decide");

    assert_eq!(outcome.matched, 2);
    assert_eq!(outcome.modified, 1);
    assert_eq!(outcome.missing, vec![missing.to_string()]);
    let classes: Vec<ErrorClass> =
        outcome.failures.iter().map(|failure| failure.error_class).collect();
    assert_eq!(classes, vec![ErrorClass::NotFound, ErrorClass::AlreadyProcessed]);

    let approved: Subscriber =
        harness.service.get(&manager(), pending.meta.id).await.expect("reload");
    assert_eq!(approved.status, SubscriberStatus::Active);
}

#[tokio::test]
async fn bulk_request_with_a_malformed_id_touches_nothing() {
    let harness = harness();
    let pending: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-1")).await.expect("create");

    let error = harness
        .service
        .bulk_delete::<Subscriber>(&admin(), vec![pending.meta.id.to_string(), "not-an-id".to_string()])
        .await
        .expect_err("malformed id");

    assert_eq!(error, ApplicationError::MalformedIds(vec!["not-an-id".to_string()]));
    let untouched: Subscriber =
        harness.service.get(&manager(), pending.meta.id).await.expect("reload");
    assert!(!untouched.meta.is_deleted);
}

#[tokio::test]
async fn bulk_delete_soft_deletes_every_match() {
    let harness = harness();
    let first: Subscriber =
        harness.service.create(&staff(), subscriber_draft("BLR-1")).await.expect("first");
    let second = active_subscriber(&harness, "BLR-2").await;
    let absent = EntityId::new().to_string();

    let outcome = harness
        .service
        .bulk_delete::<Subscriber>(
            &admin(),
            vec![first.meta.id.to_string(), absent.clone(), second.meta.id.to_string()],
        )
        .await
        .expect("bulk delete");

    assert_eq!((outcome.matched, outcome.modified), (2, 2));
    assert_eq!(outcome.missing, vec![absent.clone()]);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].id, absent);
    assert_eq!(outcome.failures[0].error_class, ErrorClass::NotFound);
    let pending: Vec<Subscriber> =
        harness.service.list_pending(&manager()).await.expect("pending list");
    assert!(pending.is_empty());
}

/// Yields to the runtime after every read so concurrent calls interleave between their
/// load and their guarded write. With `blind_lookup` it also reports every business id
/// as free, leaving collisions to the insert.
#[derive(Clone, Default)]
struct InterleavingStore {
    inner: InMemoryEntityStore,
    blind_lookup: bool,
}

#[async_trait::async_trait]
impl BusinessIdLookup for InterleavingStore {
    async fn business_id_exists(
        &self,
        kind: EntityKind,
        candidate: &str,
    ) -> Result<bool, StoreError> {
        if self.blind_lookup {
            return Ok(false);
        }
        self.inner.business_id_exists(kind, candidate).await
    }
}

#[async_trait::async_trait]
impl<E: Approvable> EntityStore<E> for InterleavingStore {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, StoreError> {
        let found = EntityStore::<E>::find_by_id(&self.inner, id).await;
        tokio::task::yield_now().await;
        found
    }

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<E>, StoreError> {
        EntityStore::<E>::list(&self.inner, filter).await
    }

    async fn insert(&self, entity: &E) -> Result<(), StoreError> {
        EntityStore::<E>::insert(&self.inner, entity).await
    }

    async fn update_guarded(&self, entity: &E, guard: WriteGuard) -> Result<bool, StoreError> {
        EntityStore::<E>::update_guarded(&self.inner, entity, guard).await
    }
}

type InterleavedService = ApprovalService<InterleavingStore, InMemoryAuditSink, RoleAuthorizer>;

fn interleaved(store: InterleavingStore, audit: &InMemoryAuditSink) -> InterleavedService {
    ApprovalService::new(store, audit.clone(), RoleAuthorizer, WorkflowConfig::default())
}

#[tokio::test]
async fn concurrent_decisions_settle_exactly_once() {
    let audit = InMemoryAuditSink::default();
    let service = interleaved(InterleavingStore::default(), &audit);
    let created: Subscriber =
        service.create(&staff(), subscriber_draft("BLR-1")).await.expect("create");

    let manager_actor = manager();
    let admin_actor = admin();
    let (approve, reject) = tokio::join!(
        service.decide::<Subscriber>(
            &manager_actor,
            created.meta.id,
            Decision::Approve,
            DecisionPayload::with_status("Active"),
        ),
        service.decide::<Subscriber>(
            &admin_actor,
            created.meta.id,
            Decision::Reject,
            DecisionPayload::default(),
        ),
    );

    let (settled, lost) = match (approve, reject) {
        (Ok(settled), Err(lost)) | (Err(lost), Ok(settled)) => (settled, lost),
        (approve, reject) => panic!("expected one winner, got {approve:?} and {reject:?}"),
    };
    assert!(matches!(lost, ApplicationError::AlreadyProcessed { .. }), "{lost:?}");
    assert_eq!(settled.meta.version, 1);

    let stored: Subscriber = service.get(&manager(), created.meta.id).await.expect("reload");
    assert_eq!(stored.meta.version, 1);
    assert_eq!(stored.meta.request_status, settled.meta.request_status);

    let rejected = audit
        .events()
        .iter()
        .filter(|event| event.outcome == AuditOutcome::Rejected)
        .count();
    assert_eq!(rejected, 1);
}

#[tokio::test]
async fn concurrent_proposals_do_not_overwrite_each_other() {
    let audit = InMemoryAuditSink::default();
    let service = interleaved(InterleavingStore::default(), &audit);
    let created: Subscriber =
        service.create(&staff(), subscriber_draft("BLR-1")).await.expect("create");
    let active: Subscriber = service
        .decide(&manager(), created.meta.id, Decision::Approve, DecisionPayload::with_status("Active"))
        .await
        .expect("approve");

    let staff_actor = staff();
    let (first, second) = tokio::join!(
        service.propose::<Subscriber>(&staff_actor, active.meta.id, Proposal::new(mrc(600))),
        service.propose::<Subscriber>(&staff_actor, active.meta.id, Proposal::new(mrc(700))),
    );

    let (recorded, lost) = match (first, second) {
        (Ok(recorded), Err(lost)) | (Err(lost), Ok(recorded)) => (recorded, lost),
        (first, second) => panic!("expected one winner, got {first:?} and {second:?}"),
    };
    assert!(
        matches!(lost, ApplicationError::Conflict { reason: ConflictReason::StaleWrite, .. }),
        "{lost:?}"
    );

    let stored: Subscriber = service.get(&manager(), active.meta.id).await.expect("reload");
    assert_eq!(stored.meta.version, active.meta.version + 1);
    assert_eq!(stored.meta.modified_data, recorded.meta.modified_data);
}

#[tokio::test]
async fn insert_collision_draws_a_fresh_business_id() {
    let audit = InMemoryAuditSink::default();
    let store = InterleavingStore { blind_lookup: true, ..InterleavingStore::default() };
    let ids = IdGenerator::with_source(ScriptedSuffix::new(["11111", "11111", "22222"]), 5);
    let service = interleaved(store.clone(), &audit).with_id_generator(ids);

    let first: Subscriber =
        service.create(&staff(), subscriber_draft("BLR-1")).await.expect("first");
    let second: Subscriber =
        service.create(&staff(), subscriber_draft("BLR-2")).await.expect("second");

    assert_eq!(first.meta.business_id.0, "SUB-11111");
    assert_eq!(second.meta.business_id.0, "SUB-22222");
    assert_eq!(store.inner.len(EntityKind::Subscriber).await, 2);
}

#[tokio::test]
async fn insert_collisions_spend_the_same_attempt_budget() {
    let audit = InMemoryAuditSink::default();
    let store = InterleavingStore { blind_lookup: true, ..InterleavingStore::default() };
    let ids = IdGenerator::with_source(ScriptedSuffix::new(["11111", "11111", "11111"]), 2);
    let service = interleaved(store.clone(), &audit).with_id_generator(ids);

    service.create::<Subscriber>(&staff(), subscriber_draft("BLR-1")).await.expect("first");
    let error = service
        .create::<Subscriber>(&staff(), subscriber_draft("BLR-2"))
        .await
        .expect_err("budget spent on insert collisions");

    assert!(matches!(error, ApplicationError::GenerationExhausted { attempts: 2, .. }), "{error:?}");
    assert_eq!(store.inner.len(EntityKind::Subscriber).await, 1);
}
