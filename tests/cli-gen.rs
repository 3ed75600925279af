use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*; // Used for writing assertions
use std::process::Command; // Run programs

#[test]
fn gen_with_target_args() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("gen")
        .arg("--target")
        .arg(dir.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Generated"));

    assert!(dir.path().join("config.yaml").exists());
}

#[test]
fn gen_refuses_existing_target() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.yaml"), "").unwrap();

    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("gen")
        .arg("--target")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("target already exists"));
}

#[test]
/// The generated config must pass validate
fn gen_then_validate() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("redshiftctl")
        .unwrap()
        .arg("gen")
        .arg("--target")
        .arg(dir.path())
        .assert()
        .success();

    Command::cargo_bin("redshiftctl")
        .unwrap()
        .arg("validate")
        .arg("--file")
        .arg(dir.path().join("config.yaml"))
        .env("REDSHIFT_USERNAME", "admin")
        .env("REDSHIFT_PASSWORD", "secret")
        .env("ETL_PASSWORD", "secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok"));
}

#[test]
/// Test gen-pass
fn gen_pass() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("gen-pass")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated password:"))
        .stdout(predicate::str::contains(
            "Hint: Please provide --username to generate MD5",
        ));
}

#[test]
/// Test gen-pass with --username
fn gen_pass_with_username() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("gen-pass")
        .arg("--username")
        .arg("test")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated password:"))
        .stdout(predicate::str::contains("Generated MD5"));
}

#[test]
/// Test gen-pass with --username and --password, generate MD5
/// For example:
/// ```
/// redshiftctl gen-pass --username duyet --password 123456
///
/// Generated password: 123456
/// Generated MD5 (user: duyet): md5de3331387913465470ce1772a279be8e
/// ```
fn gen_pass_with_username_and_password() {
    let mut cmd = Command::cargo_bin("redshiftctl").unwrap();
    cmd.arg("gen-pass")
        .arg("--username")
        .arg("duyet")
        .arg("--password")
        .arg("123456")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Generated MD5 (user: duyet): md5de3331387913465470ce1772a279be8e",
        ));
}
