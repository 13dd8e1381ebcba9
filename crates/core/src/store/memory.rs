use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::entity::{Approvable, UniqueKey};
use crate::domain::meta::{EntityId, EntityKind};
use crate::domain::payment::Payment;
use crate::domain::subscriber::Subscriber;

use super::{
    BusinessIdLookup, EntityFilter, EntityStore, RenewalStore, StoreError, StoredDocument,
    WriteGuard,
};

#[derive(Default)]
struct Collection {
    records: HashMap<EntityId, StoredDocument>,
    keys: HashMap<UniqueKey, EntityId>,
}

impl Collection {
    fn check_keys(&self, kind: EntityKind, stored: &StoredDocument) -> Result<(), StoreError> {
        for key in stored.all_keys() {
            if let Some(owner) = self.keys.get(&key) {
                if *owner != stored.id {
                    return Err(StoreError::DuplicateKey { kind, key: key.name, value: key.value });
                }
            }
        }
        Ok(())
    }

    fn put(&mut self, stored: StoredDocument) {
        if let Some(previous) = self.records.get(&stored.id) {
            for key in previous.all_keys() {
                self.keys.remove(&key);
            }
        }
        for key in stored.all_keys() {
            self.keys.insert(key, stored.id);
        }
        self.records.insert(stored.id, stored);
    }

    fn admits(&self, id: EntityId, guard: WriteGuard) -> bool {
        self.records
            .get(&id)
            .is_some_and(|existing| guard.admits(existing.version, existing.request_status))
    }
}

/// Process-local store keyed by entity kind. Clones share the same collections.
#[derive(Clone, Default)]
pub struct InMemoryEntityStore {
    collections: Arc<RwLock<HashMap<EntityKind, Collection>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self, kind: EntityKind) -> usize {
        let collections = self.collections.read().await;
        collections.get(&kind).map_or(0, |collection| collection.records.len())
    }
}

#[async_trait::async_trait]
impl BusinessIdLookup for InMemoryEntityStore {
    async fn business_id_exists(
        &self,
        kind: EntityKind,
        candidate: &str,
    ) -> Result<bool, StoreError> {
        let collections = self.collections.read().await;
        let key = UniqueKey::new(UniqueKey::BUSINESS_ID, candidate);
        Ok(collections.get(&kind).is_some_and(|collection| collection.keys.contains_key(&key)))
    }
}

#[async_trait::async_trait]
impl<E: Approvable> EntityStore<E> for InMemoryEntityStore {
    async fn find_by_id(&self, id: EntityId) -> Result<Option<E>, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(&E::KIND)
            .and_then(|collection| collection.records.get(&id))
            .map(StoredDocument::decode::<E>)
            .transpose()
    }

    async fn list(&self, filter: &EntityFilter) -> Result<Vec<E>, StoreError> {
        let collections = self.collections.read().await;
        let Some(collection) = collections.get(&E::KIND) else {
            return Ok(Vec::new());
        };
        let mut matched: Vec<&StoredDocument> =
            collection.records.values().filter(|stored| filter.matches(stored)).collect();
        matched.sort_by(|left, right| {
            left.created_at.cmp(&right.created_at).then_with(|| left.id.cmp(&right.id))
        });
        matched.into_iter().map(StoredDocument::decode::<E>).collect()
    }

    async fn insert(&self, entity: &E) -> Result<(), StoreError> {
        let stored = StoredDocument::from_entity(entity)?;
        let mut collections = self.collections.write().await;
        let collection = collections.entry(E::KIND).or_default();
        if collection.records.contains_key(&stored.id) {
            return Err(StoreError::DuplicateKey {
                kind: E::KIND,
                key: "id".to_string(),
                value: stored.id.to_string(),
            });
        }
        collection.check_keys(E::KIND, &stored)?;
        collection.put(stored);
        Ok(())
    }

    async fn update_guarded(&self, entity: &E, guard: WriteGuard) -> Result<bool, StoreError> {
        let stored = StoredDocument::from_entity(entity)?;
        let mut collections = self.collections.write().await;
        let collection = collections.entry(E::KIND).or_default();
        if !collection.admits(stored.id, guard) {
            debug!(
                event_name = "store.guard_mismatch",
                entity_kind = E::KIND.as_str(),
                entity_id = %stored.id,
                expected_version = guard.version,
                "conditional update skipped"
            );
            return Ok(false);
        }
        collection.check_keys(E::KIND, &stored)?;
        collection.put(stored);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl RenewalStore for InMemoryEntityStore {
    async fn insert_payment_with_renewal(
        &self,
        payment: &Payment,
        subscriber: &Subscriber,
        guard: WriteGuard,
    ) -> Result<bool, StoreError> {
        let payment = StoredDocument::from_entity(payment)?;
        let subscriber = StoredDocument::from_entity(subscriber)?;
        let mut collections = self.collections.write().await;

        let subscribers = collections.entry(EntityKind::Subscriber).or_default();
        if !subscribers.admits(subscriber.id, guard) {
            return Ok(false);
        }
        subscribers.check_keys(EntityKind::Subscriber, &subscriber)?;

        let payments = collections.entry(EntityKind::Payment).or_default();
        payments.check_keys(EntityKind::Payment, &payment)?;
        payments.put(payment);

        collections.entry(EntityKind::Subscriber).or_default().put(subscriber);
        Ok(true)
    }
}
