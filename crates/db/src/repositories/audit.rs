use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use fieldops_core::audit::{AuditAction, AuditEvent, AuditOutcome};
use fieldops_core::domain::meta::{ActorRef, EntityKind};

use super::RepositoryError;
use crate::DbPool;

/// Append-only audit trail backed by the `audit_event` table.
#[derive(Clone)]
pub struct SqlAuditLog {
    pool: DbPool,
}

impl SqlAuditLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        self.append_all(std::slice::from_ref(event)).await
    }

    pub async fn append_all(&self, events: &[AuditEvent]) -> Result<(), RepositoryError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for event in events {
            sqlx::query(
                "INSERT INTO audit_event (
                    event_id, entity_kind, entity_id, business_id, action, performed_by,
                    outcome, changes_json, metadata_json, occurred_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&event.event_id)
            .bind(event.entity_kind.as_str())
            .bind(&event.entity_id)
            .bind(event.business_id.as_deref())
            .bind(event.action.as_str())
            .bind(event.performed_by.as_str())
            .bind(event.outcome.as_str())
            .bind(serde_json::to_string(&event.changes)?)
            .bind(serde_json::to_string(&event.metadata)?)
            .bind(event.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Events for one record, oldest first.
    pub async fn list_for_entity(
        &self,
        kind: EntityKind,
        entity_id: &str,
    ) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT event_id, entity_kind, entity_id, business_id, action, performed_by,
                    outcome, changes_json, metadata_json, occurred_at
             FROM audit_event
             WHERE entity_kind = ? AND entity_id = ?
             ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(kind.as_str())
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(audit_event_from_row).collect()
    }
}

fn audit_event_from_row(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let kind: String = row.try_get("entity_kind")?;
    let action: String = row.try_get("action")?;
    let outcome: String = row.try_get("outcome")?;
    let changes: String = row.try_get("changes_json")?;
    let metadata: String = row.try_get("metadata_json")?;
    let occurred_at: String = row.try_get("occurred_at")?;

    Ok(AuditEvent {
        event_id: row.try_get("event_id")?,
        entity_kind: EntityKind::parse(&kind)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown entity kind `{kind}`")))?,
        entity_id: row.try_get("entity_id")?,
        business_id: row.try_get("business_id")?,
        action: AuditAction::parse(&action)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown audit action `{action}`")))?,
        performed_by: ActorRef::new(row.try_get::<String, _>("performed_by")?),
        outcome: AuditOutcome::parse(&outcome)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown audit outcome `{outcome}`")))?,
        changes: serde_json::from_str(&changes)?,
        metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata)?,
        occurred_at: DateTime::parse_from_rfc3339(&occurred_at)
            .map(|value| value.with_timezone(&Utc))
            .map_err(|error| RepositoryError::Decode(format!("occurred_at: {error}")))?,
    })
}
