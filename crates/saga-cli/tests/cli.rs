use std::fs;

use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

const FAST_CONFIG: &str = r"[retry]
base_delay_ms = 0

[relay]
cycle_delay_ms = 0
";

struct DataDir {
    dir: TempDir,
}

impl DataDir {
    fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        fs::write(dir.path().join("saga.toml"), FAST_CONFIG).expect("write config");
        Self { dir }
    }

    fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("saga");
        cmd.arg("--data-dir")
            .arg(self.dir.path().join("data"))
            .arg("--config")
            .arg(self.dir.path().join("saga.toml"))
            .env("RUST_LOG", "warn");
        cmd
    }

    fn read_json(&self, relative: &str) -> Value {
        let content =
            fs::read_to_string(self.dir.path().join("data").join(relative)).expect("read file");
        serde_json::from_str(&content).expect("parse file")
    }
}

#[test]
fn run_provisions_the_default_saga() {
    let data = DataDir::new();

    data.command()
        .arg("run")
        .assert()
        .success()
        .stdout(contains("SUCCEEDED"))
        .stdout(contains("✓ ProvisionUser"))
        .stdout(contains("✓ AssignPermissions"))
        .stdout(contains("permissions: [\"read\",\"write\"]"));

    let outbox = data.read_json("outbox.json");
    assert_eq!(outbox["events"].as_array().expect("events").len(), 3);
    let resources = data.read_json("resources.json");
    assert_eq!(resources["quota"].as_object().expect("quotas").len(), 1);
}

#[test]
fn failing_step_rolls_back_and_reports_the_cause() {
    let data = DataDir::new();

    data.command()
        .args(["run", "--fail", "assign_permissions"])
        .assert()
        .failure()
        .stdout(contains("COMPENSATED"))
        .stdout(contains("✗ AssignPermissions (4 attempts)"))
        .stdout(contains("↩ CreateQuota"))
        .stderr(contains("was rolled back"))
        .stderr(contains("caused by: step 'AssignPermissions' failed: simulated failure"));

    let outbox = data.read_json("outbox.json");
    assert_eq!(outbox["events"].as_array().expect("events").len(), 2);
}

#[test]
fn failed_saga_does_not_undo_an_earlier_saga() {
    let data = DataDir::new();
    data.command().arg("run").assert().success();
    data.command()
        .args(["run", "--fail", "assign_permissions"])
        .assert()
        .failure();

    let resources = data.read_json("resources.json");
    assert_eq!(resources["quota"].as_object().expect("quotas").len(), 1);
    assert_eq!(resources["user"].as_object().expect("users").len(), 1);
}

#[test]
fn exhausted_step_shows_up_in_dead_letter_listing() {
    let data = DataDir::new();
    data.command()
        .args(["run", "--fail", "CreateQuota"])
        .assert()
        .failure();

    data.command()
        .arg("dlq")
        .assert()
        .success()
        .stdout(contains("Dead-lettered: 1"))
        .stdout(contains("CreateQuota (create_quota)"))
        .stdout(contains("after 3 retries"));

    let output = data
        .command()
        .args(["dlq", "--json"])
        .output()
        .expect("run dlq --json");
    let entries: Value = serde_json::from_slice(&output.stdout).expect("parse dlq json");
    let entries = entries.as_array().expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["step"], "CreateQuota");
    assert_eq!(entries[0]["status"], "failed");
}

#[test]
fn drain_with_consume_replays_the_saga() {
    let data = DataDir::new();
    data.command().arg("run").assert().success();

    data.command()
        .args(["drain", "--consume"])
        .assert()
        .success()
        .stdout(contains("3 sent"))
        .stdout(contains("3 processed"));

    let contexts = data.read_json("consumer/saga_state.json");
    let sagas = contexts.as_object().expect("saga contexts");
    assert_eq!(sagas.len(), 1);
    let context = sagas.values().next().expect("context");
    assert_eq!(context["user"]["name"], "alice");
    assert_eq!(context["permissions"], serde_json::json!(["read", "write"]));

    data.command()
        .arg("drain")
        .assert()
        .success()
        .stdout(contains("No pending events."));
}

#[test]
fn consumer_failures_end_in_the_dead_letter_store() {
    let data = DataDir::new();
    data.command().arg("run").assert().success();

    data.command()
        .args(["drain", "--consume", "--fail", "assign_permissions"])
        .assert()
        .success()
        .stdout(contains("2 processed, 2 redelivered, 1 dead-lettered"));

    data.command()
        .arg("dlq")
        .assert()
        .success()
        .stdout(contains("AssignPermissions (assign_permissions)"))
        .stdout(contains("consumer redeliveries: 3"));
}

#[test]
fn empty_dead_letter_store() {
    let data = DataDir::new();

    data.command()
        .arg("dlq")
        .assert()
        .success()
        .stdout(contains("Dead-letter store is empty."));
}

#[test]
fn invalid_config_is_reported() {
    let data = DataDir::new();
    fs::write(data.dir.path().join("saga.toml"), "[[steps]]\ntype = 3\n").expect("write config");

    data.command()
        .arg("run")
        .assert()
        .failure()
        .stderr(contains("failed to parse config file"));
}
