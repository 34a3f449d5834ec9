use std::time::Instant;

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Step is executing.
    Running,
    /// Step executed successfully.
    Executed,
    /// Step failed after its retries were exhausted.
    Failed,
    /// Step was rolled back successfully.
    Compensated,
    /// Step rollback failed.
    CompensationFailed,
}

/// Record of one registered step's execution in the saga.
#[derive(Debug)]
pub struct StepRecord {
    /// Name of the step.
    pub name: String,
    /// Current status.
    pub status: StepStatus,
    /// Number of times `execute` was invoked.
    pub attempts: u32,
    /// When the step started executing.
    pub started_at: Instant,
    /// When the step completed (execution or rollback).
    pub completed_at: Option<Instant>,
    /// Description of the rollback (set once the step executed).
    pub compensation_description: Option<String>,
}

/// Audit log tracking all step executions and rollbacks in a saga.
///
/// Records are indexed by the step's registration position, so steps that
/// share a name are still tracked separately.
#[derive(Debug, Default)]
pub struct SagaAuditLog {
    records: Vec<StepRecord>,
}

impl SagaAuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&mut self, name: &str) {
        self.records.push(StepRecord {
            name: name.to_string(),
            status: StepStatus::Running,
            attempts: 0,
            started_at: Instant::now(),
            completed_at: None,
            compensation_description: None,
        });
    }

    pub(crate) fn record_failure(&mut self, attempts: u32) {
        if let Some(record) = self.records.last_mut() {
            record.status = StepStatus::Failed;
            record.attempts = attempts;
            record.completed_at = Some(Instant::now());
        }
    }

    pub(crate) fn record_success(&mut self, attempts: u32, compensation_description: String) {
        if let Some(record) = self.records.last_mut() {
            record.status = StepStatus::Executed;
            record.attempts = attempts;
            record.completed_at = Some(Instant::now());
            record.compensation_description = Some(compensation_description);
        }
    }

    pub(crate) fn record_compensated(&mut self, index: usize) {
        self.set_compensation_status(index, StepStatus::Compensated);
    }

    pub(crate) fn record_compensation_failed(&mut self, index: usize) {
        self.set_compensation_status(index, StepStatus::CompensationFailed);
    }

    fn set_compensation_status(&mut self, index: usize, status: StepStatus) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = status;
            record.completed_at = Some(Instant::now());
        }
    }

    /// Get all records in the audit log.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Total number of `execute` invocations across all steps.
    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.records.iter().map(|r| r.attempts).sum()
    }

    /// Names of the steps that were rolled back, in registration order.
    #[must_use]
    pub fn compensated_steps(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Compensated)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Get a summary of the saga execution for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Running => "…",
                StepStatus::Executed => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensated => "↩",
                StepStatus::CompensationFailed => "⚠",
            };
            if record.attempts > 1 {
                lines.push(format!(
                    "{status} {} ({} attempts)",
                    record.name, record.attempts
                ));
            } else {
                lines.push(format!("{status} {}", record.name));
            }
        }
        lines.join("\n")
    }
}
