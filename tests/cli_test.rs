use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_demo_run_prints_account_and_history() {
    let mut cmd = Command::cargo_bin("ledgerflow").unwrap();
    cmd.args(["--transactions", "6", "--workers", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("account ACC-0001 balance"))
        .stdout(predicate::str::contains("status=Success"))
        .stdout(predicate::str::contains("status=Failed"));
}

#[test]
fn test_zero_workers_is_rejected() {
    let mut cmd = Command::cargo_bin("ledgerflow").unwrap();
    cmd.args(["--workers", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}
