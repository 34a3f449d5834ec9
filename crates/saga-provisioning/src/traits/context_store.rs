use saga_core::SagaContext;

use crate::error::StoreError;

/// Saga contexts kept between delivered commands, keyed by saga id.
pub trait ContextStore: Send + Sync {
    /// Loads the context of `saga_id`, or a fresh context bound to that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn load(&self, saga_id: &str) -> Result<SagaContext, StoreError>;

    /// # Errors
    ///
    /// Returns an error if the context cannot be persisted.
    fn save(&self, saga_id: &str, context: &SagaContext) -> Result<(), StoreError>;
}
