use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use saga_core::SagaContext;
use serde_json::Value;

use super::resource_id;
use crate::error::StoreError;
use crate::traits::{ContextStore, ResourceKind, ResourceStore};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_| StoreError::LockPoisoned)
}

#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    resources: Mutex<BTreeMap<ResourceKind, BTreeMap<String, Value>>>,
}

impl InMemoryResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResourceStore for InMemoryResourceStore {
    fn create(&self, kind: ResourceKind, fields: Value) -> Result<String, StoreError> {
        let id = resource_id(&fields);
        lock(&self.resources)?
            .entry(kind)
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), StoreError> {
        if let Some(by_id) = lock(&self.resources)?.get_mut(&kind) {
            by_id.remove(id);
        }
        Ok(())
    }

    fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(lock(&self.resources)?
            .get(&kind)
            .and_then(|by_id| by_id.get(id))
            .cloned())
    }

    fn ids(&self, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
        Ok(lock(&self.resources)?
            .get(&kind)
            .map(|by_id| by_id.keys().cloned().collect())
            .unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContextStore {
    contexts: Mutex<HashMap<String, SagaContext>>,
}

impl InMemoryContextStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContextStore for InMemoryContextStore {
    fn load(&self, saga_id: &str) -> Result<SagaContext, StoreError> {
        Ok(lock(&self.contexts)?
            .get(saga_id)
            .cloned()
            .unwrap_or_else(|| SagaContext::with_saga_id(saga_id)))
    }

    fn save(&self, saga_id: &str, context: &SagaContext) -> Result<(), StoreError> {
        lock(&self.contexts)?.insert(saga_id.to_string(), context.clone());
        Ok(())
    }
}
