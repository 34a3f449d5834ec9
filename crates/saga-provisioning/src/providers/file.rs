use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use saga_core::SagaContext;
use saga_outbox::write_atomically;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::resource_id;
use crate::error::StoreError;
use crate::traits::{ContextStore, ResourceKind, ResourceStore};

pub const RESOURCES_FILENAME: &str = "resources.json";
pub const CONTEXT_FILENAME: &str = "saga_state.json";

type ResourceMap = BTreeMap<ResourceKind, BTreeMap<String, Value>>;
type ContextMap = BTreeMap<String, SagaContext>;

/// A JSON document holding one value of type `T`, replaced atomically on
/// every change. A missing or empty file reads as `T::default()`.
#[derive(Debug)]
struct JsonDocument {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonDocument {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    fn load<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        if !self.path.exists() {
            return Ok(T::default());
        }
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Read {
            path: self.path.clone(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&content).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn save<T: Serialize>(&self, value: &T) -> Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(value).map_err(|source| StoreError::Serialize {
                path: self.path.clone(),
                source,
            })?;
        write_atomically(&self.path, content.as_bytes()).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "store file written");
        Ok(())
    }

    fn read<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        self.load()
    }

    fn modify<T, R, F>(&self, change: F) -> Result<R, StoreError>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.lock.lock().map_err(|_| StoreError::LockPoisoned)?;
        let mut value = self.load()?;
        let result = change(&mut value);
        self.save(&value)?;
        Ok(result)
    }
}

/// Resource store persisted as `{"user": {...}, "permissions": {...},
/// "quota": {...}}`, each map keyed by resource id.
#[derive(Debug)]
pub struct JsonFileResourceStore {
    document: JsonDocument,
}

impl JsonFileResourceStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path.into()),
        }
    }

    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(RESOURCES_FILENAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.document.path
    }
}

impl ResourceStore for JsonFileResourceStore {
    fn create(&self, kind: ResourceKind, fields: Value) -> Result<String, StoreError> {
        let id = resource_id(&fields);
        self.document.modify(|resources: &mut ResourceMap| {
            resources
                .entry(kind)
                .or_default()
                .insert(id.clone(), fields);
        })?;
        Ok(id)
    }

    fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), StoreError> {
        self.document.modify(|resources: &mut ResourceMap| {
            if let Some(by_id) = resources.get_mut(&kind) {
                by_id.remove(id);
            }
        })
    }

    fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>, StoreError> {
        let mut resources: ResourceMap = self.document.read()?;
        Ok(resources.get_mut(&kind).and_then(|by_id| by_id.remove(id)))
    }

    fn ids(&self, kind: ResourceKind) -> Result<Vec<String>, StoreError> {
        let mut resources: ResourceMap = self.document.read()?;
        Ok(resources
            .remove(&kind)
            .map(|by_id| by_id.into_keys().collect())
            .unwrap_or_default())
    }
}

/// Context store persisted as a JSON object keyed by saga id.
#[derive(Debug)]
pub struct JsonFileContextStore {
    document: JsonDocument,
}

impl JsonFileContextStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            document: JsonDocument::new(path.into()),
        }
    }

    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CONTEXT_FILENAME))
    }
}

impl ContextStore for JsonFileContextStore {
    fn load(&self, saga_id: &str) -> Result<SagaContext, StoreError> {
        let mut contexts: ContextMap = self.document.read()?;
        Ok(contexts
            .remove(saga_id)
            .unwrap_or_else(|| SagaContext::with_saga_id(saga_id)))
    }

    fn save(&self, saga_id: &str, context: &SagaContext) -> Result<(), StoreError> {
        self.document.modify(|contexts: &mut ContextMap| {
            contexts.insert(saga_id.to_string(), context.clone());
        })
    }
}
