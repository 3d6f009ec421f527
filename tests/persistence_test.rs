#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_keeps_decoded_action_between_runs() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state_db");

    // 1. First run: decode and save the action
    let mut cmd1 = Command::new(cargo_bin!("checkout-engine"));
    cmd1.arg("decode-action")
        .arg("tests/fixtures/await_action.json")
        .arg("--db-path")
        .arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());

    // 2. Second run: the saved state is read back from the same DB path
    let mut cmd2 = Command::new(cargo_bin!("checkout-engine"));
    cmd2.arg("saved-state").arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let saved: serde_json::Value = serde_json::from_slice(&output2.stdout).unwrap();

    assert_eq!(saved["action"]["type"], "await");
    assert_eq!(saved["paymentData"], "Ab02b4c0!BQABAgA");
}

#[test]
fn test_fresh_database_has_no_saved_state() {
    let dir = tempdir().unwrap();

    let output = Command::new(cargo_bin!("checkout-engine"))
        .arg("saved-state")
        .arg("--db-path")
        .arg(dir.path().join("empty_db"))
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let saved: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(saved["action"].is_null());
    assert!(saved["paymentData"].is_null());
}
