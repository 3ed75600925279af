use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::process::Command; // Run programs

#[test]
fn missing_arguments() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.assert().failure();
}

#[test]
fn unknown_subcommand() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("destroy").assert().failure();
}

#[test]
/// `redshiftctl apply` must have --file or -f args
fn apply_missing_arguments() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}

#[test]
/// `redshiftctl inspect` must have --file or -f args
fn inspect_missing_arguments() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("inspect")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}
