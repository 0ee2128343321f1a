use predicates::prelude::*;
use vendup::test_utils::tree_snapshot;

use crate::common::TestWorkspace;

#[test]
fn test_validate_clean_package() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/lib", "v1.0").unwrap();
    let before = tree_snapshot(ws.root());

    // LICENSE differs from upstream but is preserved, so it does not count
    ws.vendup()
        .args(["validate", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No local modifications."));

    assert_eq!(tree_snapshot(ws.root()), before);
}

#[test]
fn test_validate_reports_modified_files() {
    let ws = TestWorkspace::new().unwrap();
    let package = ws.add_package("vendor/lib", "v1.0").unwrap();
    std::fs::write(package.join("src.c"), "int version = 1; /* hacked */\n").unwrap();
    std::fs::write(package.join("extra.c"), "int extra;\n").unwrap();

    ws.vendup()
        .args(["validate", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Local modifications:"))
        .stdout(predicate::str::contains("src.c"))
        .stdout(predicate::str::contains("extra.c"));
}

#[test]
fn test_validate_unknown_version() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/lib", "v9.9").unwrap();

    ws.vendup()
        .args(["validate", "vendor/lib"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no such version"));
}
