use chrono::NaiveDate;
use fieldops_core::audit::{AuditAction, InMemoryAuditSink};
use fieldops_core::auth::{Actor, Role, RoleAuthorizer};
use fieldops_core::config::WorkflowConfig;
use fieldops_core::domain::meta::{EntityKind, RequestStatus};
use fieldops_core::domain::payment::{Payment, TransactionType};
use fieldops_core::domain::subscriber::{IspInfo, Subscriber, SubscriberStatus};
use fieldops_core::domain::value::ChangeSet;
use fieldops_core::errors::ApplicationError;
use fieldops_core::workflow::{ApprovalService, Decision, DecisionPayload, Proposal};
use fieldops_db::{connect_with_settings, migrations, SqlAuditLog, SqlEntityStore};
use rust_decimal::Decimal;

type SqlService = ApprovalService<SqlEntityStore, InMemoryAuditSink, RoleAuthorizer>;

async fn service() -> (SqlService, InMemoryAuditSink, SqlAuditLog) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    let audit = InMemoryAuditSink::default();
    let service = ApprovalService::new(
        SqlEntityStore::new(pool.clone()),
        audit.clone(),
        RoleAuthorizer,
        WorkflowConfig::default(),
    );
    (service, audit, SqlAuditLog::new(pool))
}

fn staff() -> Actor {
    Actor::new("emp-staff", [Role::Staff])
}

fn manager() -> Actor {
    Actor::new("emp-manager", [Role::Manager])
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn draft() -> Subscriber {
    Subscriber {
        customer_name: "Asha Traders".to_string(),
        site_code: "BLR-1".to_string(),
        isp_info: IspInfo {
            mrc: Some(Decimal::new(500, 0)),
            renewal_date: Some(date(2025, 1, 1)),
            ..IspInfo::default()
        },
        ..Subscriber::default()
    }
}

#[tokio::test]
async fn proposal_lifecycle_persists_through_sqlite() {
    let (service, audit, log) = service().await;

    let created: Subscriber = service.create(&staff(), draft()).await.expect("create");
    let approved: Subscriber = service
        .decide(&manager(), created.meta.id, Decision::Approve, DecisionPayload::with_status("Active"))
        .await
        .expect("approve");
    assert_eq!(approved.status, SubscriberStatus::Active);

    let changes = ChangeSet::new().with("ispInfo.mrc", Decimal::new(600, 0)).expect("changes");
    let proposed: Subscriber = service
        .propose(&staff(), created.meta.id, Proposal::new(changes))
        .await
        .expect("propose");
    assert_eq!(proposed.status, SubscriberStatus::Modified);

    let pending: Vec<Subscriber> = service.list_pending(&manager()).await.expect("pending");
    assert_eq!(pending.len(), 1);

    let settled: Subscriber = service
        .decide(&manager(), created.meta.id, Decision::Approve, DecisionPayload::default())
        .await
        .expect("approve edit");
    assert_eq!(settled.status, SubscriberStatus::Active);
    assert_eq!(settled.isp_info.mrc, Some(Decimal::new(600, 0)));
    assert_eq!(settled.meta.request_status, RequestStatus::Approved);
    assert_eq!(settled.meta.version, 3);

    let repeat = service
        .decide::<Subscriber>(&manager(), created.meta.id, Decision::Approve, DecisionPayload::default())
        .await
        .expect_err("already settled");
    assert!(matches!(repeat, ApplicationError::AlreadyProcessed { .. }));

    log.append_all(&audit.drain()).await.expect("flush audit");
    let trail = log
        .list_for_entity(EntityKind::Subscriber, &created.meta.id.to_string())
        .await
        .expect("trail");
    let actions: Vec<AuditAction> = trail.iter().map(|event| event.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Create,
            AuditAction::Approve,
            AuditAction::Propose,
            AuditAction::Approve,
            AuditAction::Approve,
        ]
    );
}

#[tokio::test]
async fn income_payment_renews_the_subscriber_in_one_transaction() {
    let (service, _audit, _log) = service().await;
    let created: Subscriber = service.create(&staff(), draft()).await.expect("create");

    let payment = service
        .record_payment(
            &manager(),
            Payment {
                transaction_type: TransactionType::Income,
                subscriber_id: Some(created.meta.id),
                transaction_mode: "bank transfer".to_string(),
                amount: Decimal::new(6000, 0),
                activation_date: Some(date(2025, 1, 1)),
                expiry_date: Some(date(2026, 1, 1)),
                ..Payment::default()
            },
        )
        .await
        .expect("payment");

    assert!(payment.meta.business_id.0.starts_with("TR-"));
    let renewed: Subscriber = service.get(&manager(), created.meta.id).await.expect("reload");
    assert_eq!(renewed.isp_info.renewal_date, Some(date(2026, 1, 1)));
    assert_eq!(renewed.meta.version, 1);
}
