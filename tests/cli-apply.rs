use assert_cmd::prelude::*; // Add methods on commands
use indoc::indoc;
use predicates::prelude::*; // Used for writing assertions
use std::fs;
use std::process::Command; // Run programs

#[test]
fn apply_missing_file_args() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("apply")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}

#[test]
/// A directory target needs --all
fn apply_directory_without_all_fails() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("apply")
        .arg("--file")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("--all"));
}

#[test]
fn apply_nonexistent_file_fails() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("apply")
        .arg("--file")
        .arg("/nonexistent/config.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read config file"));
}

#[test]
fn apply_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.yaml");
    fs::write(&file, "not a config").unwrap();

    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("apply")
        .arg("--file")
        .arg(&file)
        .assert()
        .failure();
}

#[test]
/// Config validation runs before any connection is attempted
fn apply_rejects_bad_privileges_offline() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.yaml");
    let config = indoc! {"
        connection:
          host: localhost
          username: admin
          password: secret

        default_privileges:
          - owner: etl
            group: analysts
            privileges:
              - execute
    "};
    fs::write(&file, config).unwrap();

    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("apply")
        .arg("--file")
        .arg(&file)
        .arg("--dryrun")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid privilege"));
}
