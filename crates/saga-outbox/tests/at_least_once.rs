use std::cell::RefCell;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use saga_core::Sleeper;
use saga_outbox::{
    DEFAULT_QUEUE, DeadLetterStore, EventStatus, InMemoryDeadLetterStore, InMemoryOutboxStore,
    InMemoryTransport, JsonFileDeadLetterStore, JsonFileOutboxStore, OutboxEvent, OutboxRelay,
    OutboxStore, RelayDeliveryError, RelayPolicy, deliver_via,
};
use serde_json::json;

#[derive(Default)]
struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.lock().expect("sleeper lock").push(duration);
    }
}

fn in_memory_relay() -> OutboxRelay {
    OutboxRelay::new(
        Arc::new(InMemoryOutboxStore::new()),
        Arc::new(InMemoryDeadLetterStore::new()),
    )
}

fn provisioning_event(step: &str, saga_id: &str) -> OutboxEvent {
    OutboxEvent::new(step, step.to_lowercase(), saga_id, json!({"saga": saga_id}))
}

#[test]
fn each_failed_drain_costs_exactly_one_retry_until_dead_lettered() {
    let relay = in_memory_relay();
    relay
        .record(provisioning_event("ProvisionUser", "saga-1"))
        .expect("record");
    let attempts = RefCell::new(0);

    for drain in 1..=3_u32 {
        relay
            .drain(|_| {
                *attempts.borrow_mut() += 1;
                Err(RelayDeliveryError::Rejected("downstream timeout".to_string()))
            })
            .expect("drain");

        let event = &relay.outbox().events().expect("events")[0];
        assert_eq!(event.retries, drain);
    }

    assert_eq!(*attempts.borrow(), 3);
    assert!(relay.pending().expect("pending").is_empty());
    let dead = relay.dead_letters().entries().expect("entries");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].event.step, "ProvisionUser");
    assert_eq!(dead[0].event.status, EventStatus::Failed);

    let report = relay
        .drain(|_| panic!("dead-lettered events are never redelivered"))
        .expect("drain after dead letter");
    assert!(report.is_empty());
}

#[test]
fn run_cycles_recovers_from_transient_broker_outage() {
    let relay = in_memory_relay().with_policy(RelayPolicy::new(3, Duration::from_millis(100)));
    let transport = InMemoryTransport::failing_first(1);
    let sleeper = RecordingSleeper::default();
    relay
        .record(provisioning_event("CreateQuota", "saga-2"))
        .expect("record");

    let report = relay
        .run_cycles(deliver_via(&transport, DEFAULT_QUEUE), 5, &sleeper)
        .expect("run cycles");

    assert_eq!(report.retried, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(report.dead_lettered, 0);
    assert_eq!(transport.len(DEFAULT_QUEUE), 1);
    assert_eq!(
        *sleeper.delays.lock().expect("sleeper lock"),
        vec![Duration::from_millis(100)]
    );
}

#[test]
fn run_cycles_stops_at_cycle_limit() {
    let relay = in_memory_relay().with_policy(RelayPolicy::new(10, Duration::from_millis(1)));
    let sleeper = RecordingSleeper::default();
    relay
        .record(provisioning_event("AssignPermissions", "saga-3"))
        .expect("record");

    let report = relay
        .run_cycles(
            |_| Err(RelayDeliveryError::Rejected("nope".to_string())),
            4,
            &sleeper,
        )
        .expect("run cycles");

    assert_eq!(report.retried, 4);
    assert_eq!(relay.pending().expect("pending").len(), 1);
    assert_eq!(
        *sleeper.delays.lock().expect("sleeper lock"),
        vec![
            Duration::from_millis(1),
            Duration::from_millis(2),
            Duration::from_millis(4)
        ]
    );
}

#[test]
fn file_backed_relay_resumes_after_restart() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let open = || {
        OutboxRelay::new(
            Arc::new(JsonFileOutboxStore::in_dir(dir.path())),
            Arc::new(JsonFileDeadLetterStore::in_dir(dir.path())),
        )
    };

    let first = open();
    first.record(provisioning_event("ProvisionUser", "saga-4"))?;
    first.record(provisioning_event("CreateQuota", "saga-4"))?;
    first.drain(|e| {
        if e.step == "CreateQuota" {
            Err(RelayDeliveryError::Rejected("quota service down".to_string()))
        } else {
            Ok(())
        }
    })?;
    drop(first);

    let second = open();
    let pending = second.pending()?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].step, "CreateQuota");
    assert_eq!(pending[0].retries, 1);

    let transport = InMemoryTransport::new();
    let report = second.drain(deliver_via(&transport, DEFAULT_QUEUE))?;

    assert_eq!(report.sent, 1);
    assert_eq!(transport.messages(DEFAULT_QUEUE)[0]["step"], "CreateQuota");
    Ok(())
}

#[test]
fn concurrent_drains_deliver_each_event_once() {
    let relay = Arc::new(in_memory_relay());
    for n in 0..50 {
        relay
            .record(provisioning_event("ProvisionUser", &format!("saga-{n}")))
            .expect("record");
    }
    let transport = Arc::new(InMemoryTransport::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let relay = Arc::clone(&relay);
            let transport = Arc::clone(&transport);
            std::thread::spawn(move || {
                relay
                    .drain(deliver_via(transport.as_ref(), DEFAULT_QUEUE))
                    .expect("drain")
            })
        })
        .collect();
    let sent: usize = handles
        .into_iter()
        .map(|h| h.join().expect("drain thread").sent)
        .sum();

    assert_eq!(sent, 50);
    assert_eq!(transport.len(DEFAULT_QUEUE), 50);
}
