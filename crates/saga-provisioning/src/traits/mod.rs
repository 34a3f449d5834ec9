mod context_store;
mod resource_store;

pub use context_store::ContextStore;
pub use resource_store::{ResourceKind, ResourceStore};
