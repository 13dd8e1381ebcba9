use fieldops_core::audit::InMemoryAuditSink;
use fieldops_core::auth::{Actor, Role, RoleAuthorizer};
use fieldops_core::domain::employee::Employee;
use fieldops_core::domain::entity::{Approvable, LifecycleStatus};
use fieldops_core::domain::meta::{EntityId, EntityKind};
use fieldops_core::domain::payment::Payment;
use fieldops_core::domain::subscriber::Subscriber;
use fieldops_core::domain::ticket::Ticket;
use fieldops_core::errors::ApplicationError;
use fieldops_core::workflow::{ApprovalService, Decision, DecisionPayload};
use fieldops_db::{SqlAuditLog, SqlEntityStore};
use tracing::warn;

use crate::commands::{build_runtime, load_config, open_store, CommandResult};

type CliService = ApprovalService<SqlEntityStore, InMemoryAuditSink, RoleAuthorizer>;

#[derive(Clone, Debug)]
pub struct DecideRequest {
    pub kind: EntityKind,
    pub id: String,
    pub actor: String,
    pub role: Role,
    pub decision: Decision,
    pub status: Option<String>,
    pub remark: Option<String>,
}

pub fn run(request: DecideRequest) -> CommandResult {
    let Some(id) = EntityId::parse(&request.id) else {
        return CommandResult::workflow_failure(
            "decide",
            &ApplicationError::MalformedIds(vec![request.id.clone()]),
        );
    };

    let config = match load_config("decide") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("decide") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_store("decide", &config).await?;
        let audit = InMemoryAuditSink::default();
        let service = ApprovalService::new(
            SqlEntityStore::new(pool.clone()),
            audit.clone(),
            RoleAuthorizer,
            config.workflow.clone(),
        );

        let actor = Actor::new(request.actor.clone(), [request.role]);
        let payload = DecisionPayload {
            status: request.status.clone(),
            remark: request.remark.clone(),
            ..DecisionPayload::default()
        };
        let outcome = match request.kind {
            EntityKind::Employee => settle::<Employee>(&service, &actor, id, &request, payload).await,
            EntityKind::Subscriber => {
                settle::<Subscriber>(&service, &actor, id, &request, payload).await
            }
            EntityKind::Payment => settle::<Payment>(&service, &actor, id, &request, payload).await,
            EntityKind::Ticket => settle::<Ticket>(&service, &actor, id, &request, payload).await,
        };

        if let Err(error) = SqlAuditLog::new(pool.clone()).append_all(&audit.drain()).await {
            warn!(
                event_name = "cli.audit.flush_failed",
                error = %error,
                "audit events could not be persisted"
            );
        }
        pool.close().await;
        outcome.map_err(|error| CommandResult::workflow_failure("decide", &error))
    });

    match result {
        Ok(message) => CommandResult::success("decide", message),
        Err(failure) => failure,
    }
}

async fn settle<E: Approvable>(
    service: &CliService,
    actor: &Actor,
    id: EntityId,
    request: &DecideRequest,
    payload: DecisionPayload,
) -> Result<String, ApplicationError> {
    let entity: E = service.decide(actor, id, request.decision, payload).await?;
    let meta = entity.meta();
    Ok(format!(
        "{} {} {}: status {}, request {}",
        request.decision,
        E::KIND,
        meta.business_id,
        entity.status().as_str(),
        meta.request_status
    ))
}
