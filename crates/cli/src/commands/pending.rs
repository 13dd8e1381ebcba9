use fieldops_core::audit::TracingAuditSink;
use fieldops_core::auth::{Actor, Role, RoleAuthorizer};
use fieldops_core::domain::employee::Employee;
use fieldops_core::domain::entity::{Approvable, LifecycleStatus};
use fieldops_core::domain::meta::EntityKind;
use fieldops_core::domain::payment::Payment;
use fieldops_core::domain::subscriber::Subscriber;
use fieldops_core::domain::ticket::Ticket;
use fieldops_core::errors::ApplicationError;
use fieldops_core::workflow::ApprovalService;
use fieldops_db::SqlEntityStore;
use serde::Serialize;
use serde_json::Value;

use crate::commands::{build_runtime, load_config, open_store, CommandResult};

type CliService = ApprovalService<SqlEntityStore, TracingAuditSink, RoleAuthorizer>;

#[derive(Debug, Serialize)]
struct PendingRecord {
    id: String,
    business_id: String,
    status: String,
    created_by: String,
    /// `{previous, current}` when an edit awaits a decision; `null` for a first-time creation.
    changes: Value,
}

#[derive(Debug, Serialize)]
struct PendingReport {
    kind: EntityKind,
    count: usize,
    records: Vec<PendingRecord>,
}

pub fn run(kind: EntityKind, json_output: bool) -> CommandResult {
    let config = match load_config("pending") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime("pending") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_store("pending", &config).await?;
        let service = ApprovalService::new(
            SqlEntityStore::new(pool.clone()),
            TracingAuditSink,
            RoleAuthorizer,
            config.workflow.clone(),
        );
        let records = match kind {
            EntityKind::Employee => pending_records::<Employee>(&service).await,
            EntityKind::Subscriber => pending_records::<Subscriber>(&service).await,
            EntityKind::Payment => pending_records::<Payment>(&service).await,
            EntityKind::Ticket => pending_records::<Ticket>(&service).await,
        };
        pool.close().await;
        records.map_err(|error| CommandResult::workflow_failure("pending", &error))
    });

    let records = match result {
        Ok(records) => records,
        Err(failure) => return failure,
    };

    if json_output {
        let report = PendingReport { kind, count: records.len(), records };
        return match serde_json::to_string_pretty(&report) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure("pending", "serialization", error.to_string(), 1),
        };
    }

    let listing = records
        .iter()
        .map(|record| format!("{} ({})", record.business_id, record.status))
        .collect::<Vec<_>>()
        .join(", ");
    let message = if records.is_empty() {
        format!("no pending {kind} records")
    } else {
        format!("{} pending {kind} record(s): {listing}", records.len())
    };
    CommandResult::success("pending", message)
}

async fn pending_records<E: Approvable>(
    service: &CliService,
) -> Result<Vec<PendingRecord>, ApplicationError> {
    let operator = Actor::new("fieldops-cli", [Role::Staff]);
    let entities: Vec<E> = service.list_pending(&operator).await?;
    Ok(entities
        .iter()
        .map(|entity| {
            let meta = entity.meta();
            PendingRecord {
                id: meta.id.to_string(),
                business_id: meta.business_id.to_string(),
                status: entity.status().as_str().to_string(),
                created_by: meta.created_by.to_string(),
                changes: meta.modified_data.as_ref().map_or(Value::Null, |envelope| {
                    serde_json::json!({
                        "previous": envelope.previous.to_nested_json(),
                        "current": envelope.current.to_nested_json(),
                    })
                }),
            }
        })
        .collect())
}
