use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::domain::entity::{Approvable, LifecycleStatus, UniqueKey};
use crate::domain::meta::{EntityId, EntityKind, RequestStatus};
use crate::domain::payment::Payment;
use crate::domain::subscriber::Subscriber;

pub mod memory;

pub use memory::InMemoryEntityStore;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("duplicate {key} `{value}` in {kind} collection")]
    DuplicateKey { kind: EntityKind, key: String, value: String },
    #[error("store backend failure: {0}")]
    Backend(String),
    #[error("stored document could not be decoded: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn is_business_id_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateKey { key, .. } if key == UniqueKey::BUSINESS_ID)
    }
}

/// Precondition a conditional write must still satisfy at commit time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteGuard {
    pub version: u64,
    pub request_status: Option<RequestStatus>,
}

impl WriteGuard {
    pub fn at_version(version: u64) -> Self {
        Self { version, request_status: None }
    }

    pub fn pending_at(version: u64) -> Self {
        Self { version, request_status: Some(RequestStatus::Pending) }
    }

    pub fn admits(&self, version: u64, request_status: RequestStatus) -> bool {
        self.version == version
            && self.request_status.map_or(true, |required| required == request_status)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub request_status: Option<RequestStatus>,
    pub status: Option<String>,
    pub include_deleted: bool,
}

impl EntityFilter {
    pub fn pending() -> Self {
        Self { request_status: Some(RequestStatus::Pending), ..Self::default() }
    }

    pub fn matches(&self, document: &StoredDocument) -> bool {
        (self.include_deleted || !document.is_deleted)
            && self.request_status.map_or(true, |wanted| wanted == document.request_status)
            && self.status.as_deref().map_or(true, |wanted| wanted == document.status)
    }
}

/// An entity flattened into the columns every backend indexes plus its full JSON document.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub kind: EntityKind,
    pub id: EntityId,
    pub business_id: String,
    pub status: String,
    pub request_status: RequestStatus,
    pub is_deleted: bool,
    pub version: u64,
    pub unique_keys: Vec<UniqueKey>,
    pub document: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredDocument {
    pub fn from_entity<E: Approvable>(entity: &E) -> Result<Self, StoreError> {
        let meta = entity.meta();
        let document =
            serde_json::to_value(entity).map_err(|error| StoreError::Decode(error.to_string()))?;
        Ok(Self {
            kind: E::KIND,
            id: meta.id,
            business_id: meta.business_id.0.clone(),
            status: entity.status().as_str().to_string(),
            request_status: meta.request_status,
            is_deleted: meta.is_deleted,
            version: meta.version,
            unique_keys: entity.unique_keys(),
            document,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
        })
    }

    pub fn decode<E: Approvable>(&self) -> Result<E, StoreError> {
        serde_json::from_value(self.document.clone())
            .map_err(|error| StoreError::Decode(format!("{} {}: {error}", self.kind, self.id)))
    }

    /// The business id followed by the entity's own unique keys.
    pub fn all_keys(&self) -> Vec<UniqueKey> {
        let mut keys = Vec::with_capacity(self.unique_keys.len() + 1);
        keys.push(UniqueKey::new(UniqueKey::BUSINESS_ID, self.business_id.clone()));
        keys.extend(self.unique_keys.iter().cloned());
        keys
    }
}

#[async_trait]
pub trait BusinessIdLookup: Send + Sync {
    async fn business_id_exists(&self, kind: EntityKind, candidate: &str)
        -> Result<bool, StoreError>;
}

#[async_trait]
pub trait EntityStore<E: Approvable>: BusinessIdLookup {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, StoreError>;
    async fn list(&self, filter: &EntityFilter) -> Result<Vec<E>, StoreError>;
    /// Fails with [`StoreError::DuplicateKey`] when the business id or any unique key is taken.
    async fn insert(&self, entity: &E) -> Result<(), StoreError>;
    /// Replaces the stored record only if it still satisfies `guard`. Returns `false` otherwise.
    async fn update_guarded(&self, entity: &E, guard: WriteGuard) -> Result<bool, StoreError>;
}

/// Payment creation that also moves the linked subscriber's renewal window.
#[async_trait]
pub trait RenewalStore: EntityStore<Payment> + EntityStore<Subscriber> {
    /// Inserts `payment` and replaces `subscriber` atomically. Returns `false`, writing nothing,
    /// when the subscriber no longer satisfies `guard`.
    async fn insert_payment_with_renewal(
        &self,
        payment: &Payment,
        subscriber: &Subscriber,
        guard: WriteGuard,
    ) -> Result<bool, StoreError>;
}
