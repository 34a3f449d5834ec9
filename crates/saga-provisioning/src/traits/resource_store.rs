use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Kinds of resources a provisioning saga creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    User,
    Permissions,
    Quota,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Permissions => "permissions",
            Self::Quota => "quota",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persistence for provisioned resources.
///
/// Implementations serialize writes internally so that concurrently running
/// sagas can share one store.
pub trait ResourceStore: Send + Sync {
    /// Stores `fields` as a resource of `kind` and returns its id.
    ///
    /// If `fields` carries a string `id`, that id is used and an existing
    /// resource with the same id is replaced; otherwise the store assigns one.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be persisted.
    fn create(&self, kind: ResourceKind, fields: Value) -> Result<String, StoreError>;

    /// Deletes a resource. Deleting a missing resource succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), StoreError>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>, StoreError>;

    /// Ids of all stored resources of `kind`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn ids(&self, kind: ResourceKind) -> Result<Vec<String>, StoreError>;
}
