mod file;
mod memory;

pub use file::{CONTEXT_FILENAME, JsonFileContextStore, JsonFileResourceStore, RESOURCES_FILENAME};
pub use memory::{InMemoryContextStore, InMemoryResourceStore};

use serde_json::Value;
use uuid::Uuid;

/// The caller-supplied `id` field, or a fresh one.
fn resource_id(fields: &Value) -> String {
    fields
        .get("id")
        .and_then(Value::as_str)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string)
}
