use predicates::prelude::*;
use serde_json::{Value, json};
use vendup::test_utils::tree_snapshot;

use crate::common::TestWorkspace;

#[test]
fn test_check_up_to_date_leaves_tree_alone() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/lib", "v2.0").unwrap();
    let before = tree_snapshot(ws.root());

    ws.vendup()
        .args(["check", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vendor/lib"))
        .stdout(predicate::str::contains("Up to date."));

    // Running it twice changes nothing either
    ws.vendup().args(["check", "vendor/lib"]).assert().success();
    assert_eq!(tree_snapshot(ws.root()), before);
}

#[test]
fn test_check_reports_newer_tag() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/lib", "v1.0").unwrap();
    let before = tree_snapshot(ws.root());

    ws.vendup()
        .args(["check", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Current version: v1.0"))
        .stdout(predicate::str::contains("Latest version: v2.0"))
        .stdout(predicate::str::contains("Out of date!"));
    assert_eq!(tree_snapshot(ws.root()), before);
}

#[test]
fn test_check_detects_one_new_commit() {
    let ws = TestWorkspace::new().unwrap();
    let pinned = ws.upstream().head().unwrap();
    ws.add_package("vendor/lib", &pinned).unwrap();

    ws.vendup()
        .args(["check", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Up to date."));

    ws.upstream().commit_file("new.c", "int added;\n").unwrap();
    let tip = ws.upstream().head().unwrap();

    ws.vendup()
        .args(["check", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains(tip))
        .stdout(predicate::str::contains("Out of date!"));
}

#[test]
fn test_check_all_writes_json_report() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/b", "v2.0").unwrap();
    ws.add_package("vendor/a", "v1.0").unwrap();
    let report = ws.root().join("report.json");

    ws.vendup()
        .args(["check", "--all", "--json-output"])
        .arg(&report)
        .assert()
        .success();

    let content = std::fs::read_to_string(&report).unwrap();
    let parsed: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(
        parsed,
        json!({
            "vendor/a": {"current": "v1.0", "latest": "v2.0"},
            "vendor/b": {"current": "v2.0", "latest": "v2.0"},
        })
    );
}

#[test]
fn test_check_with_root_flag() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/lib", "v1.0").unwrap();

    ws.vendup()
        .current_dir(std::env::temp_dir())
        .arg("--root")
        .arg(ws.root())
        .args(["check", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vendor/lib"))
        .stdout(predicate::str::contains("Out of date!"));
}

#[test]
fn test_check_failure_exits_nonzero() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/good", "v2.0").unwrap();
    std::fs::create_dir_all(ws.root().join("vendor/broken")).unwrap();

    ws.vendup()
        .args(["check", "vendor/good", "vendor/broken"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Up to date."))
        .stderr(predicate::str::contains("file not found"))
        .stderr(predicate::str::contains("1 of 2 packages failed"));
}

#[test]
fn test_check_without_packages_is_an_error() {
    let ws = TestWorkspace::new().unwrap();

    ws.vendup()
        .args(["check"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No packages to check"));
}
