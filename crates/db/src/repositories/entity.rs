use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::debug;

use fieldops_core::domain::entity::{Approvable, UniqueKey};
use fieldops_core::domain::meta::{EntityId, EntityKind};
use fieldops_core::domain::payment::Payment;
use fieldops_core::domain::subscriber::Subscriber;
use fieldops_core::store::{
    BusinessIdLookup, EntityFilter, EntityStore, RenewalStore, StoreError, StoredDocument,
    WriteGuard,
};

use super::RepositoryError;
use crate::DbPool;

/// All four collections share one table keyed by `(kind, id)`; the entity itself is stored as JSON.
#[derive(Clone)]
pub struct SqlEntityStore {
    pool: DbPool,
}

impl SqlEntityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn fetch_document(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> Result<Option<String>, RepositoryError> {
        let document = sqlx::query_scalar::<_, String>(
            "SELECT document FROM approvable_entity WHERE kind = ? AND id = ?",
        )
        .bind(kind.as_str())
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(document)
    }

    async fn fetch_documents(
        &self,
        kind: EntityKind,
        filter: &EntityFilter,
    ) -> Result<Vec<String>, RepositoryError> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT document FROM approvable_entity WHERE kind = ");
        query.push_bind(kind.as_str());
        if !filter.include_deleted {
            query.push(" AND is_deleted = 0");
        }
        if let Some(request_status) = filter.request_status {
            query.push(" AND request_status = ");
            query.push_bind(request_status.as_str());
        }
        if let Some(status) = &filter.status {
            query.push(" AND status = ");
            query.push_bind(status.clone());
        }
        query.push(" ORDER BY created_at ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("document").map_err(RepositoryError::from))
            .collect()
    }

    async fn insert_stored(&self, stored: &StoredDocument) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        insert_document(&mut tx, stored).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn update_stored(
        &self,
        stored: &StoredDocument,
        guard: WriteGuard,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        if !update_document(&mut tx, stored, guard).await? {
            return Ok(false);
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn renew(
        &self,
        payment: &StoredDocument,
        subscriber: &StoredDocument,
        guard: WriteGuard,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;
        if !update_document(&mut tx, subscriber, guard).await? {
            return Ok(false);
        }
        insert_document(&mut tx, payment).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl BusinessIdLookup for SqlEntityStore {
    async fn business_id_exists(
        &self,
        kind: EntityKind,
        candidate: &str,
    ) -> Result<bool, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM approvable_entity WHERE kind = ? AND business_id = ?",
        )
        .bind(kind.as_str())
        .bind(candidate)
        .fetch_one(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(count > 0)
    }
}

#[async_trait::async_trait]
impl<E: Approvable> EntityStore<E> for SqlEntityStore {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, StoreError> {
        let Some(document) = self.fetch_document(E::KIND, id).await? else {
            return Ok(None);
        };
        Ok(Some(decode(&document)?))
    }

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<E>, StoreError> {
        let documents = self.fetch_documents(E::KIND, filter).await?;
        documents.iter().map(|document| decode(document).map_err(StoreError::from)).collect()
    }

    async fn insert(&self, entity: &E) -> Result<(), StoreError> {
        let stored = StoredDocument::from_entity(entity)?;
        Ok(self.insert_stored(&stored).await?)
    }

    async fn update_guarded(&self, entity: &E, guard: WriteGuard) -> Result<bool, StoreError> {
        let stored = StoredDocument::from_entity(entity)?;
        Ok(self.update_stored(&stored, guard).await?)
    }
}

#[async_trait::async_trait]
impl RenewalStore for SqlEntityStore {
    async fn insert_payment_with_renewal(
        &self,
        payment: &Payment,
        subscriber: &Subscriber,
        guard: WriteGuard,
    ) -> Result<bool, StoreError> {
        let payment = StoredDocument::from_entity(payment)?;
        let subscriber = StoredDocument::from_entity(subscriber)?;
        Ok(self.renew(&payment, &subscriber, guard).await?)
    }
}

fn decode<E: Approvable>(document: &str) -> Result<E, RepositoryError> {
    serde_json::from_str(document)
        .map_err(|error| RepositoryError::Decode(format!("{}: {error}", E::KIND)))
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn version_column(version: u64) -> Result<i64, RepositoryError> {
    i64::try_from(version)
        .map_err(|_| RepositoryError::Decode(format!("version {version} exceeds the storage range")))
}

async fn insert_document(
    conn: &mut SqliteConnection,
    stored: &StoredDocument,
) -> Result<(), RepositoryError> {
    ensure_keys_free(conn, stored).await?;
    sqlx::query(
        "INSERT INTO approvable_entity (
            kind, id, business_id, status, request_status, is_deleted, version,
            document, created_at, updated_at
         ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(stored.kind.as_str())
    .bind(stored.id.to_string())
    .bind(&stored.business_id)
    .bind(&stored.status)
    .bind(stored.request_status.as_str())
    .bind(stored.is_deleted)
    .bind(version_column(stored.version)?)
    .bind(serde_json::to_string(&stored.document)?)
    .bind(timestamp(stored.created_at))
    .bind(timestamp(stored.updated_at))
    .execute(&mut *conn)
    .await
    .map_err(|error| insert_conflict(stored, error))?;

    write_keys(conn, stored).await
}

async fn update_document(
    conn: &mut SqliteConnection,
    stored: &StoredDocument,
    guard: WriteGuard,
) -> Result<bool, RepositoryError> {
    let required_status = guard.request_status.map(|status| status.as_str());
    let result = sqlx::query(
        "UPDATE approvable_entity
         SET business_id = ?, status = ?, request_status = ?, is_deleted = ?, version = ?,
             document = ?, updated_at = ?
         WHERE kind = ? AND id = ? AND version = ? AND (? IS NULL OR request_status = ?)",
    )
    .bind(&stored.business_id)
    .bind(&stored.status)
    .bind(stored.request_status.as_str())
    .bind(stored.is_deleted)
    .bind(version_column(stored.version)?)
    .bind(serde_json::to_string(&stored.document)?)
    .bind(timestamp(stored.updated_at))
    .bind(stored.kind.as_str())
    .bind(stored.id.to_string())
    .bind(version_column(guard.version)?)
    .bind(required_status)
    .bind(required_status)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        debug!(
            event_name = "store.guard_mismatch",
            entity_kind = stored.kind.as_str(),
            entity_id = %stored.id,
            expected_version = guard.version,
            "conditional update skipped"
        );
        return Ok(false);
    }

    ensure_keys_free(conn, stored).await?;
    write_keys(conn, stored).await?;
    Ok(true)
}

/// Fails when another record of the same kind already holds the business id or a unique key.
async fn ensure_keys_free(
    conn: &mut SqliteConnection,
    stored: &StoredDocument,
) -> Result<(), RepositoryError> {
    let id = stored.id.to_string();
    let business_owner = sqlx::query_scalar::<_, String>(
        "SELECT id FROM approvable_entity WHERE kind = ? AND business_id = ?",
    )
    .bind(stored.kind.as_str())
    .bind(&stored.business_id)
    .fetch_optional(&mut *conn)
    .await?;
    if business_owner.is_some_and(|owner| owner != id) {
        return Err(duplicate(
            stored.kind,
            UniqueKey::new(UniqueKey::BUSINESS_ID, stored.business_id.clone()),
        ));
    }

    for key in &stored.unique_keys {
        let owner = sqlx::query_scalar::<_, String>(
            "SELECT entity_id FROM entity_unique_key
             WHERE kind = ? AND key_name = ? AND key_value = ?",
        )
        .bind(stored.kind.as_str())
        .bind(&key.name)
        .bind(&key.value)
        .fetch_optional(&mut *conn)
        .await?;
        if owner.is_some_and(|owner| owner != id) {
            return Err(duplicate(stored.kind, key.clone()));
        }
    }
    Ok(())
}

async fn write_keys(
    conn: &mut SqliteConnection,
    stored: &StoredDocument,
) -> Result<(), RepositoryError> {
    let id = stored.id.to_string();
    sqlx::query("DELETE FROM entity_unique_key WHERE kind = ? AND entity_id = ?")
        .bind(stored.kind.as_str())
        .bind(&id)
        .execute(&mut *conn)
        .await?;

    for key in &stored.unique_keys {
        sqlx::query(
            "INSERT INTO entity_unique_key (kind, key_name, key_value, entity_id)
             VALUES (?, ?, ?, ?)",
        )
        .bind(stored.kind.as_str())
        .bind(&key.name)
        .bind(&key.value)
        .bind(&id)
        .execute(&mut *conn)
        .await
        .map_err(|error| key_conflict(stored.kind, key, error))?;
    }
    Ok(())
}

/// A key claimed by a concurrent writer after `ensure_keys_free` passed.
fn key_conflict(kind: EntityKind, key: &UniqueKey, error: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(database) = &error {
        if database.is_unique_violation() {
            return duplicate(kind, key.clone());
        }
    }
    error.into()
}

fn duplicate(kind: EntityKind, key: UniqueKey) -> RepositoryError {
    RepositoryError::Duplicate { kind, key: key.name, value: key.value }
}

/// Maps a unique-constraint failure raised by a concurrent writer onto the key it hit.
fn insert_conflict(stored: &StoredDocument, error: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(database) = &error {
        if database.is_unique_violation() {
            return if database.message().contains("business_id") {
                duplicate(
                    stored.kind,
                    UniqueKey::new(UniqueKey::BUSINESS_ID, stored.business_id.clone()),
                )
            } else {
                duplicate(stored.kind, UniqueKey::new("id", stored.id.to_string()))
            };
        }
    }
    error.into()
}
