use serde_json::Value;

use crate::context::SagaContext;

/// A step in a saga that can be executed and rolled back.
///
/// Steps communicate only through the shared [`SagaContext`]: each step reads
/// what earlier steps stored there and writes its own output back. The
/// resources a step needs (stores, outboxes) are injected through
/// `Resources` rather than carried in the context.
///
/// # Type Parameters
///
/// - `Resources`: Shared dependencies (injected, not passed between steps)
/// - `Error`: The error type for step failures
pub trait SagaStep {
    /// Shared dependencies used by the step.
    type Resources;

    /// Error type for step failures.
    type Error;

    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Execute the step against the saga context.
    ///
    /// Returns the value the step produced. The step is expected to have
    /// stored it in the context as well.
    ///
    /// # Errors
    ///
    /// Returns an error if a precondition is unmet or the operation fails.
    fn execute(
        &self,
        resources: &Self::Resources,
        ctx: &mut SagaContext,
    ) -> Result<Value, Self::Error>;

    /// Undo the step's effects.
    ///
    /// Called during compensation when a later step fails. Must be
    /// idempotent: when there is nothing to undo the call succeeds and leaves
    /// the context untouched.
    ///
    /// The default implementation is a no-op, suitable for read-only steps.
    ///
    /// # Errors
    ///
    /// Returns an error if compensation fails. The mediator records the error
    /// and keeps rolling back the remaining steps.
    fn rollback(
        &self,
        resources: &Self::Resources,
        ctx: &mut SagaContext,
    ) -> Result<(), Self::Error> {
        let _ = (resources, ctx);
        Ok(())
    }

    /// Human-readable description of what rollback will do.
    fn compensation_description(&self) -> String {
        format!("undo {}", self.name())
    }
}
