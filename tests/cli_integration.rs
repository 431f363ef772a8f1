//! End-to-end tests of the `secretctl` binary.
//!
//! The master password is supplied via `SECRETCTL_PASSWORD` so no test
//! ever needs an interactive prompt.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PASSWORD: &str = "integration-test-pw";

fn secretctl(vault_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("secretctl").expect("binary builds");
    cmd.env("SECRETCTL_PASSWORD", PASSWORD)
        .arg("--vault-dir")
        .arg(vault_dir);
    cmd
}

#[test]
fn init_set_get_list_delete_flow() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");

    secretctl(&dir).arg("init").assert().success();

    secretctl(&dir)
        .args(["set", "api/github", "ghp_cli_token", "--tag", "work"])
        .assert()
        .success();

    secretctl(&dir)
        .args(["get", "api/github"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ghp_cli_token"));

    // Listing shows the key but never the value.
    secretctl(&dir)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("api/github"))
        .stdout(predicate::str::contains("ghp_cli_token").not());

    secretctl(&dir)
        .args(["delete", "api/github", "--force"])
        .assert()
        .success();

    secretctl(&dir)
        .args(["get", "api/github"])
        .assert()
        .failure()
        .code(1);
}

#[test]
fn init_twice_fails() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");

    secretctl(&dir).arg("init").assert().success();
    secretctl(&dir).arg("init").assert().failure().code(1);
}

#[test]
fn wrong_password_fails() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");

    secretctl(&dir).arg("init").assert().success();

    let mut cmd = Command::cargo_bin("secretctl").unwrap();
    cmd.env("SECRETCTL_PASSWORD", "not-the-password")
        .arg("--vault-dir")
        .arg(&dir)
        .args(["get", "anything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid password"));
}

#[test]
fn integrity_succeeds_on_fresh_vault() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");

    secretctl(&dir).arg("init").assert().success();
    secretctl(&dir).arg("integrity").assert().success();
}

#[test]
fn integrity_exit_code_on_corruption() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");

    secretctl(&dir).arg("init").assert().success();
    std::fs::write(dir.join("vault.salt"), b"tooshort").unwrap();

    // Exit code 3: integrity failure.
    secretctl(&dir).arg("integrity").assert().failure().code(3);
}

#[test]
fn audit_verify_reports_clean_chain() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");

    secretctl(&dir).arg("init").assert().success();
    secretctl(&dir)
        .args(["set", "k", "v-value-1"])
        .assert()
        .success();

    secretctl(&dir)
        .args(["audit", "--verify"])
        .assert()
        .success()
        .stdout(predicate::str::contains("no defects"));
}

#[test]
fn audit_since_filters_by_timestamp() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");

    secretctl(&dir).arg("init").assert().success();
    secretctl(&dir)
        .args(["set", "k", "some-value"])
        .assert()
        .success();

    // A floor far in the past keeps everything.
    secretctl(&dir)
        .args(["audit", "--since", "2000-01-01T00:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("secret.set"));

    // A floor far in the future filters everything out.
    secretctl(&dir)
        .args(["audit", "--since", "2100-01-01T00:00:00Z"])
        .assert()
        .success()
        .stdout(predicate::str::contains("empty"));

    // Garbage timestamps are rejected.
    secretctl(&dir)
        .args(["audit", "--since", "yesterday"])
        .assert()
        .failure();
}

#[test]
fn backup_and_restore_via_cli() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("vault");
    let backup = tmp.path().join("vault.backup");

    secretctl(&dir).arg("init").assert().success();
    secretctl(&dir)
        .args(["set", "db/pass", "backup-me"])
        .assert()
        .success();

    secretctl(&dir)
        .arg("backup")
        .arg(&backup)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 secret"));

    // Restore into a fresh directory and read the secret back.
    let restored = tmp.path().join("restored");
    secretctl(&restored)
        .arg("restore")
        .arg(&backup)
        .assert()
        .success();

    secretctl(&restored)
        .args(["get", "db/pass"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backup-me"));
}

#[test]
fn completions_generate() {
    Command::cargo_bin("secretctl")
        .unwrap()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("secretctl"));
}
