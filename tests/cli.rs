use std::sync::Arc;

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use tillsync::storage::Database;
use tillsync::sync::{QueueStatus, Resolution, SyncQueue};

fn tillsync(home: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("tillsync");
    cmd.env("TILLSYNC_HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn enqueue(home: &TempDir, entity_type: &str, payload: &str) -> i64 {
    let output = tillsync(home)
        .args(["-o", "json", "enqueue", entity_type, payload])
        .output()
        .unwrap();
    assert!(output.status.success());

    let item: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    item["id"].as_i64().unwrap()
}

/// Push an item to `status` the way a sync pass would.
fn settle(home: &TempDir, id: i64, status: QueueStatus) {
    let db = Database::open_at(&home.path().join("tillsync.db")).unwrap();
    let queue = SyncQueue::with_database(Arc::new(db));
    assert!(queue.claim(id).unwrap());
    let resolution = Resolution {
        status,
        attempt_count: 1,
        last_error: Some("duplicate: receipt exists".to_string()),
        next_attempt_at: None,
    };
    queue.record_outcome(id, &resolution).unwrap();
}

#[test]
fn status_on_empty_queue() {
    let home = TempDir::new().unwrap();

    tillsync(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync Queue Status"))
        .stdout(predicate::str::contains("Pending:    0"));
}

#[test]
fn enqueue_then_list_pending() {
    let home = TempDir::new().unwrap();
    enqueue(&home, "sale", r#"{"total": 1250}"#);
    enqueue(&home, "cash_movement", r#"{"amount": -500}"#);

    tillsync(&home)
        .args(["-o", "json", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 2"))
        .stdout(predicate::str::contains("cash_movement"));
}

#[test]
fn enqueue_rejects_invalid_payload() {
    let home = TempDir::new().unwrap();

    tillsync(&home)
        .args(["enqueue", "sale", "{not json"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error"))
        .stderr(predicate::str::contains("Invalid payload JSON"));
}

#[test]
fn show_unknown_item_fails() {
    let home = TempDir::new().unwrap();

    tillsync(&home)
        .args(["show", "999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn conflict_can_be_requeued_with_correction() {
    let home = TempDir::new().unwrap();
    let id = enqueue(&home, "sale", r#"{"receipt": "R-1"}"#);
    settle(&home, id, QueueStatus::Conflict);

    tillsync(&home)
        .args(["list", "--status", "conflict"])
        .assert()
        .success()
        .stdout(predicate::str::contains("receipt exists"));

    tillsync(&home)
        .args(["requeue", &id.to_string(), "--payload", r#"{"receipt": "R-1b"}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("corrected payload"));

    tillsync(&home)
        .args(["-o", "json", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"conflict\": 0"))
        .stdout(predicate::str::contains("\"pending\": 1"));
}

#[test]
fn failed_item_can_be_rearmed() {
    let home = TempDir::new().unwrap();
    let id = enqueue(&home, "sale", "{}");
    settle(&home, id, QueueStatus::Failed);

    tillsync(&home)
        .args(["rearm", &id.to_string(), "--attempts", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending again"));

    tillsync(&home)
        .args(["rearm", &id.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid transition"));
}

#[test]
fn discard_refuses_pending_items() {
    let home = TempDir::new().unwrap();
    let pending = enqueue(&home, "sale", "{}");
    let conflict = enqueue(&home, "sale", "{}");
    settle(&home, conflict, QueueStatus::Conflict);

    tillsync(&home)
        .args(["discard", &pending.to_string()])
        .assert()
        .failure();

    tillsync(&home)
        .args(["discard", &conflict.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Discarded conflict item"));
}

#[test]
fn recover_returns_syncing_items() {
    let home = TempDir::new().unwrap();
    let id = enqueue(&home, "sale", "{}");
    {
        let db = Database::open_at(&home.path().join("tillsync.db")).unwrap();
        assert!(SyncQueue::with_database(Arc::new(db)).claim(id).unwrap());
    }

    tillsync(&home)
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("Returned 1 item(s) to pending"));
}

#[test]
fn cache_put_get_remove() {
    let home = TempDir::new().unwrap();

    tillsync(&home)
        .args(["cache", "put", "product", "sku-1", r#"{"price": 250}"#])
        .assert()
        .success();

    tillsync(&home)
        .args(["-o", "json", "cache", "get", "product", "sku-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"price\": 250"));

    tillsync(&home)
        .args(["cache", "remove", "product", "sku-1"])
        .assert()
        .success();

    tillsync(&home)
        .args(["cache", "get", "product", "sku-1"])
        .assert()
        .failure();
}

#[test]
fn config_reads_yaml_defaults() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("config.yaml"),
        "general:\n  default_output: json\nsync:\n  default_priority: 2\n",
    )
    .unwrap();

    tillsync(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"default_priority\": 2"));

    let id = enqueue(&home, "sale", "{}");
    tillsync(&home)
        .args(["show", &id.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"priority\": 2"));
}

#[test]
fn bad_config_is_reported() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.yaml"), "sync: [unclosed").unwrap();

    tillsync(&home)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration error"));
}

#[test]
fn cleanup_rejects_out_of_range_window() {
    let home = TempDir::new().unwrap();

    tillsync(&home)
        .args(["cleanup", "--older-than", &(i64::MAX / 1000).to_string()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("out of range"));
}

#[test]
fn zero_interval_in_config_is_reported() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("config.yaml"), "sync:\n  interval_secs: 0\n").unwrap();

    tillsync(&home)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("interval_secs"));
}

#[test]
fn completions_for_bash() {
    let home = TempDir::new().unwrap();

    tillsync(&home)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tillsync"));
}
