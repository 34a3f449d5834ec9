//! Integration tests for saga compensation ordering.

use std::cell::RefCell;
use std::time::Duration;

use saga_core::{Mediator, RetryPolicy, SagaContext, SagaError, SagaState, SagaStep, StepError};
use serde_json::{Value, json};

#[derive(Default)]
struct Recorder {
    executed: RefCell<Vec<usize>>,
    rolled_back: RefCell<Vec<usize>>,
}

struct NumberedStep {
    position: usize,
    name: String,
    fails: bool,
}

impl NumberedStep {
    fn new(position: usize, fails: bool) -> Self {
        Self {
            position,
            name: format!("step_{position}"),
            fails,
        }
    }
}

impl SagaStep for NumberedStep {
    type Resources = Recorder;
    type Error = StepError;

    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, recorder: &Recorder, ctx: &mut SagaContext) -> Result<Value, StepError> {
        recorder.executed.borrow_mut().push(self.position);
        if self.fails {
            return Err(StepError::execution(&self.name, "resource unavailable"));
        }
        ctx.insert(self.name.clone(), json!(self.position));
        Ok(json!(self.position))
    }

    fn rollback(&self, recorder: &Recorder, ctx: &mut SagaContext) -> Result<(), StepError> {
        recorder.rolled_back.borrow_mut().push(self.position);
        ctx.remove(&self.name);
        Ok(())
    }
}

fn run(
    step_count: usize,
    failing: Option<usize>,
) -> (Recorder, SagaContext, Mediator<NumberedStep>) {
    let recorder = Recorder::default();
    let mut mediator = Mediator::new().with_retry_policy(RetryPolicy::new(3, Duration::ZERO));
    for position in 1..=step_count {
        mediator
            .register(NumberedStep::new(position, failing == Some(position)))
            .expect("registration open");
    }
    let mut ctx = SagaContext::new();
    let _ = mediator.execute_all(&recorder, &mut ctx);
    (recorder, ctx, mediator)
}

#[test]
fn compensation_inverts_completion_order_for_every_failure_position() {
    let step_count = 6;
    for failing in 1..=step_count {
        let (recorder, ctx, mediator) = run(step_count, Some(failing));

        let expected: Vec<usize> = (1..failing).rev().collect();
        assert_eq!(
            *recorder.rolled_back.borrow(),
            expected,
            "failure at step {failing}"
        );
        assert_eq!(mediator.state(), SagaState::Compensated);
        assert_eq!(ctx.keys().collect::<Vec<_>>(), vec![saga_core::SAGA_ID_KEY]);
    }
}

#[test]
fn steps_after_the_failure_never_execute() {
    let (recorder, _ctx, _mediator) = run(5, Some(3));

    let executed = recorder.executed.borrow();
    assert!(executed.iter().all(|&p| p <= 3));
    assert_eq!(executed.iter().filter(|&&p| p == 3).count(), 4);
}

#[test]
fn first_step_failure_compensates_nothing_but_still_reaches_compensated() {
    let (recorder, _ctx, mediator) = run(3, Some(1));

    assert!(recorder.rolled_back.borrow().is_empty());
    assert_eq!(mediator.state(), SagaState::Compensated);
    assert!(mediator.audit_log().compensated_steps().is_empty());
}

#[test]
fn successful_saga_rolls_back_nothing() {
    let (recorder, ctx, mediator) = run(4, None);

    assert!(recorder.rolled_back.borrow().is_empty());
    assert_eq!(mediator.state(), SagaState::Succeeded);
    assert_eq!(ctx.len(), 5);
}

#[test]
fn error_carries_saga_id_and_original_cause() {
    let recorder = Recorder::default();
    let mut mediator = Mediator::new()
        .with_retry_policy(RetryPolicy::no_retries())
        .with_id_generator(|| "saga-77".to_string());
    mediator
        .register(NumberedStep::new(1, true))
        .expect("registration open");
    let mut ctx = SagaContext::new();

    let err = mediator
        .execute_all(&recorder, &mut ctx)
        .expect_err("saga fails");

    match err {
        SagaError::StepFailed {
            saga_id,
            step,
            source,
        } => {
            assert_eq!(saga_id, "saga-77");
            assert_eq!(step, "step_1");
            assert_eq!(source.to_string(), "step 'step_1' failed: resource unavailable");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ctx.saga_id(), Some("saga-77"));
}
