//! CLI integration tests. Only commands that need no privileges are run.

use assert_cmd::Command;
use predicates::prelude::*;

fn armount() -> Command {
    Command::cargo_bin("armount").unwrap()
}

#[test]
fn plan_orders_root_first() {
    armount()
        .args(["plan", "-p", "/dev/p1", "-p", "/dev/p2", "-m", "/boot", "-m", "/"])
        .assert()
        .success()
        .stdout("/\t/dev/p2\n/boot\t/dev/p1\n");
}

#[test]
fn plan_skips_empty_targets() {
    armount()
        .args(["plan", "-p", "/dev/p1", "-p", "/dev/p2", "-m", "/boot", "-m", ""])
        .assert()
        .success()
        .stdout("/boot\t/dev/p1\n");
}

#[test]
fn plan_as_json() {
    armount()
        .args(["plan", "--json", "-p", "/dev/p1", "-m", "/"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""partition": "/dev/p1""#))
        .stdout(predicate::str::contains(r#""target": "/""#));
}

#[test]
fn plan_rejects_count_mismatch() {
    armount()
        .args(["plan", "-p", "/dev/p1", "-p", "/dev/p2", "-m", "/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Partition count mismatch"));
}

#[test]
fn plan_rejects_relative_target() {
    armount()
        .args(["plan", "-p", "a", "-p", "b", "-m", "/boot/efi", "-m", "boot"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid mount target \"boot\""))
        .stderr(predicate::str::contains("panicked").not());
}

#[test]
fn plan_reads_layout_from_config() {
    let temp = tempfile::tempdir().unwrap();
    let config = temp.path().join("mount.toml");
    std::fs::write(&config, "image_mounts = [\"/boot\", \"/\"]\n").unwrap();

    armount()
        .arg("--config")
        .arg(&config)
        .args(["plan", "-p", "/dev/p1", "-p", "/dev/p2"])
        .assert()
        .success()
        .stdout("/\t/dev/p2\n/boot\t/dev/p1\n");
}

#[test]
fn exec_requires_a_command() {
    armount()
        .args(["exec", "-p", "/dev/p1", "-m", "/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("COMMAND"));
}
