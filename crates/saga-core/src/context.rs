use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Context key that always holds the id of the saga owning the context.
pub const SAGA_ID_KEY: &str = "_saga_id";

/// Key/value data shared by the steps of one saga execution.
///
/// Steps read what earlier steps stored and add their own output. Keys keep
/// insertion order. The reserved [`SAGA_ID_KEY`] can only be set by the
/// mediator or through [`SagaContext::with_saga_id`]; `insert` and `remove`
/// leave it alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaContext {
    values: IndexMap<String, Value>,
}

impl SagaContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context already bound to a saga, e.g. when resuming work for
    /// an existing saga outside the mediator.
    #[must_use]
    pub fn with_saga_id(saga_id: impl Into<String>) -> Self {
        let mut ctx = Self::new();
        ctx.set_saga_id(saga_id);
        ctx
    }

    #[must_use]
    pub fn saga_id(&self) -> Option<&str> {
        self.values.get(SAGA_ID_KEY).and_then(Value::as_str)
    }

    pub(crate) fn set_saga_id(&mut self, saga_id: impl Into<String>) {
        self.values
            .insert(SAGA_ID_KEY.to_string(), Value::String(saga_id.into()));
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Deserialize the value under `key` into `T`.
    ///
    /// Returns `Ok(None)` if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value does not have the shape of `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, serde_json::Error> {
        self.values
            .get(key)
            .map(|value| T::deserialize(value))
            .transpose()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Store `value` under `key`, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        if key == SAGA_ID_KEY {
            warn!("ignoring write to reserved saga context key");
            return None;
        }
        self.values.insert(key, value.into())
    }

    /// Remove `key`, returning its value. Absent keys are a no-op.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        if key == SAGA_ID_KEY {
            warn!("ignoring removal of reserved saga context key");
            return None;
        }
        self.values.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_context_has_no_saga_id() {
        let ctx = SagaContext::new();

        assert!(ctx.is_empty());
        assert!(ctx.saga_id().is_none());
    }

    #[test]
    fn with_saga_id_sets_reserved_key() {
        let ctx = SagaContext::with_saga_id("saga-42");

        assert_eq!(ctx.saga_id(), Some("saga-42"));
        assert_eq!(ctx.get(SAGA_ID_KEY), Some(&json!("saga-42")));
    }

    #[test]
    fn insert_and_remove_ignore_reserved_key() {
        let mut ctx = SagaContext::with_saga_id("saga-1");

        assert!(ctx.insert(SAGA_ID_KEY, "other").is_none());
        assert!(ctx.remove(SAGA_ID_KEY).is_none());

        assert_eq!(ctx.saga_id(), Some("saga-1"));
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let mut ctx = SagaContext::new();
        ctx.insert("user", json!({"id": "u1"}));
        let before = ctx.clone();

        assert!(ctx.remove("quota").is_none());
        assert_eq!(ctx, before);
    }

    #[test]
    fn keys_keep_insertion_order_after_removal() {
        let mut ctx = SagaContext::new();
        ctx.insert("user", json!(1));
        ctx.insert("quota", json!(2));
        ctx.insert("permissions", json!(3));
        ctx.remove("quota");

        let keys: Vec<_> = ctx.keys().collect();
        assert_eq!(keys, vec!["user", "permissions"]);
    }

    #[test]
    fn get_as_deserializes_typed_values() {
        let mut ctx = SagaContext::new();
        ctx.insert("permissions", json!(["read", "write"]));

        let perms: Option<Vec<String>> = ctx.get_as("permissions").expect("shape");

        assert_eq!(perms, Some(vec!["read".to_string(), "write".to_string()]));
        assert!(ctx.get_as::<Vec<String>>("missing").expect("absent").is_none());
        assert!(ctx.get_as::<u32>("permissions").is_err());
    }

    #[test]
    fn serializes_as_flat_object() {
        let mut ctx = SagaContext::with_saga_id("s");
        ctx.insert("user", json!({"name": "alice"}));

        let value = serde_json::to_value(&ctx).expect("serialize");

        assert_eq!(value, json!({"_saga_id": "s", "user": {"name": "alice"}}));
        let back: SagaContext = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, ctx);
    }
}
