//! End-to-end runs of the `bidsync` binary against a local blob.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn bidsync(data_dir: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("bidsync").unwrap();
    cmd.arg("--data-dir").arg(data_dir).arg("--local");
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn demo_board_round_trip() {
    let dir = tempdir().unwrap();

    bidsync(dir.path())
        .args(["init", "--demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Store initialized successfully!"));

    bidsync(dir.path())
        .args(["category", "add", "demo-p1", "Okna", "--id", "c-okna"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added category 'Okna' (id: c-okna)"));

    bidsync(dir.path())
        .args(["bid", "status", "demo-p1", "demo-b2", "shortlist"])
        .assert()
        .success();

    bidsync(dir.path())
        .args(["show", "--priority", "Rekonstrukce školy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Okna  [open]  bids: 0"))
        .stdout(predicate::str::contains("Elektro Novák  [shortlist]"))
        .stdout(predicate::str::contains("Hydration order: demo-p2, demo-p1"));
}

#[test]
fn commands_need_an_initialized_store() {
    let dir = tempdir().unwrap();

    bidsync(dir.path())
        .arg("show")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Run 'bidsync init' first"));

    bidsync(dir.path())
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("NOT INITIALIZED"));
}

#[test]
fn failed_mutation_reports_notice_and_exit_code() {
    let dir = tempdir().unwrap();
    bidsync(dir.path()).args(["init", "--demo"]).assert().success();

    bidsync(dir.path())
        .args(["category", "delete", "demo-p1", "ghost"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error] Could not delete category"));
}
