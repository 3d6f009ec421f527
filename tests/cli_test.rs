use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_decode_action_reports_delegate() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("decode-action").arg("tests/fixtures/await_action.json");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("type: await"))
        .stdout(predicate::str::contains("delegate: await"))
        .stdout(predicate::str::contains("paymentMethodType: blik"))
        .stdout(predicate::str::contains("paymentData: Ab02b4c0!BQABAgA"));

    Ok(())
}

#[test]
fn test_decode_action_rejects_unknown_sdk() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("decode-action")
        .arg("tests/fixtures/unknown_sdk_action.json");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported action: sdk"));

    Ok(())
}

#[test]
fn test_redirect_result_prints_details() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("redirect-result")
        .arg("myapp://checkout?redirectResult=abc%3D%3D");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#"{"redirectResult":"abc=="}"#));

    Ok(())
}

#[test]
fn test_redirect_result_without_parameters_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("redirect-result").arg("myapp://checkout");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("could not find any query parameters"));

    Ok(())
}

#[test]
fn test_poll_without_payment_data_fails() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("poll");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No payment data to poll"));

    Ok(())
}
