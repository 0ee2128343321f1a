use flate2::Compression;
use flate2::write::GzEncoder;
use predicates::prelude::*;
use vendup::metadata::MetadataStore;
use vendup::test_utils::{TestGit, tree_snapshot, write_package};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{PATCH_BAD, PATCH_OK, TestWorkspace};

#[test]
fn test_update_swaps_in_new_version() {
    let ws = TestWorkspace::new().unwrap();
    let package = ws.add_package("vendor/lib", "v1.0").unwrap();
    std::fs::write(package.join("Android.bp"), "cc_library { name: \"lib\" }\n").unwrap();
    ws.add_patch(&package, "0001-local.diff", PATCH_OK).unwrap();

    ws.vendup()
        .args(["update", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated"))
        .stdout(predicate::str::contains("v1.0 -> v2.0"))
        .stdout(predicate::str::contains("Patches applied: 1"));

    let read = |name: &str| std::fs::read_to_string(package.join(name)).unwrap();
    assert_eq!(read("src.c"), "int version = 2; /* local */\n");
    assert_eq!(read("LICENSE"), "upstream license v2\n");
    assert_eq!(read("Android.bp"), "cc_library { name: \"lib\" }\n");
    assert!(package.join("patches/0001-local.diff").exists());

    let metadata = MetadataStore::load(&package).unwrap();
    assert_eq!(metadata.version, "v2.0");
    assert!(metadata.last_upgrade_date.is_some());
    assert_eq!(ws.siblings(&package), ["lib"]);

    ws.vendup()
        .args(["check", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Up to date."));
}

#[test]
fn test_failed_patch_leaves_package_untouched() {
    let ws = TestWorkspace::new().unwrap();
    let package = ws.add_package("vendor/lib", "v1.0").unwrap();
    ws.add_patch(&package, "0001-stale.diff", PATCH_BAD).unwrap();
    let before = tree_snapshot(ws.root());

    ws.vendup()
        .args(["update", "vendor/lib"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("0001-stale.diff failed to apply"));

    assert_eq!(tree_snapshot(ws.root()), before);
}

#[test]
fn test_update_rejects_older_version() {
    let ws = TestWorkspace::new().unwrap();
    let package = ws.add_package("vendor/lib", "v2.0").unwrap();
    let before = tree_snapshot(ws.root());

    ws.vendup()
        .args(["update", "vendor/lib", "--version", "v1.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot update to 'v1.0'"));

    assert_eq!(tree_snapshot(ws.root()), before);
    assert_eq!(MetadataStore::load(&package).unwrap().version, "v2.0");
}

#[test]
fn test_update_to_requested_version() {
    let ws = TestWorkspace::new().unwrap();
    let package = ws.add_package("vendor/lib", "v1.0").unwrap();
    ws.upstream().commit_file("src.c", "int version = 3;\n").unwrap();
    ws.upstream().tag("v3.0").unwrap();

    ws.vendup()
        .args(["update", "vendor/lib", "--version", "v2.0", "--keep-date"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1.0 -> v2.0"));

    let metadata = MetadataStore::load(&package).unwrap();
    assert_eq!(metadata.version, "v2.0");
    assert_eq!(metadata.last_upgrade_date, None);
    assert_eq!(std::fs::read_to_string(package.join("src.c")).unwrap(), "int version = 2;\n");
}

#[test]
fn test_update_refuses_concurrent_run() {
    let ws = TestWorkspace::new().unwrap();
    let package = ws.add_package("vendor/lib", "v1.0").unwrap();
    let staging = ws.root().join("vendor/.lib.vendup-staging");
    std::fs::create_dir(&staging).unwrap();

    ws.vendup()
        .args(["update", "vendor/lib"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already being updated"));

    assert!(staging.is_dir());
    assert_eq!(MetadataStore::load(&package).unwrap().version, "v1.0");
}

#[test]
fn test_update_commits_on_update_branch() {
    let ws = TestWorkspace::new().unwrap();
    let tree = TestGit::new(ws.root());
    tree.init().unwrap();
    ws.add_package("vendor/lib", "v1.0").unwrap();
    tree.add_all().unwrap();
    tree.commit("Import lib").unwrap();

    ws.vendup().args(["update", "vendor/lib"]).assert().success();

    assert_eq!(tree.current_branch().unwrap(), "vendup_auto_upgrade");
    assert_eq!(tree.last_subject().unwrap(), "Upgrade lib to v2.0");
    assert_eq!(tree.status_porcelain().unwrap(), "");
}

#[test]
fn test_update_excludes_by_name() {
    let ws = TestWorkspace::new().unwrap();
    let kept = ws.add_package("vendor/a", "v1.0").unwrap();
    let skipped = ws.add_package("vendor/b", "v1.0").unwrap();

    ws.vendup()
        .args(["update", "vendor/*", "--exclude", "b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vendor/a"))
        .stdout(predicate::str::contains("vendor/b").not());

    assert_eq!(MetadataStore::load(&kept).unwrap().version, "v2.0");
    assert_eq!(MetadataStore::load(&skipped).unwrap().version, "v1.0");
}

#[test]
fn test_update_version_needs_single_package() {
    let ws = TestWorkspace::new().unwrap();
    ws.add_package("vendor/a", "v1.0").unwrap();
    ws.add_package("vendor/b", "v1.0").unwrap();

    ws.vendup()
        .args(["update", "vendor/a", "vendor/b", "--version", "v2.0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("single package"));
}

#[test]
fn test_update_force_reinstalls_current_version() {
    let ws = TestWorkspace::new().unwrap();
    let package = ws.add_package("vendor/lib", "v2.0").unwrap();
    let before = tree_snapshot(ws.root());

    ws.vendup()
        .args(["update", "vendor/lib"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Up to date."));
    assert_eq!(tree_snapshot(ws.root()), before);

    ws.vendup()
        .args(["update", "vendor/lib", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v2.0 -> v2.0"));

    // The fixture vendors v1.0 content, so forcing repairs it
    assert_eq!(std::fs::read_to_string(package.join("src.c")).unwrap(), "int version = 2;\n");
    let metadata = MetadataStore::load(&package).unwrap();
    assert_eq!(metadata.version, "v2.0");
    assert!(metadata.last_upgrade_date.is_some());
}

#[test]
fn test_update_rejects_commit_downgrade() {
    let ws = TestWorkspace::new().unwrap();
    let older = ws.upstream().head().unwrap();
    ws.upstream().commit_file("new.c", "int added;\n").unwrap();
    let tip = ws.upstream().head().unwrap();
    let package = ws.add_package("vendor/lib", &tip).unwrap();
    let before = tree_snapshot(ws.root());

    ws.vendup()
        .args(["update", "vendor/lib", "--version", &older])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not descend from the recorded commit"));

    assert_eq!(tree_snapshot(ws.root()), before);
    assert_eq!(MetadataStore::load(&package).unwrap().version, tip);
}

#[test]
fn test_update_to_descendant_commit() {
    let ws = TestWorkspace::new().unwrap();
    let older = ws.upstream().head().unwrap();
    let package = ws.add_package("vendor/lib", &older).unwrap();
    ws.upstream().commit_file("new.c", "int added;\n").unwrap();
    ws.upstream().commit_file("other.c", "int other;\n").unwrap();
    let tip = ws.upstream().head().unwrap();

    ws.vendup().args(["update", "vendor/lib", "--version", &tip]).assert().success();

    assert_eq!(MetadataStore::load(&package).unwrap().version, tip);
    assert!(package.join("new.c").is_file());
}

/// A gzip tarball with every file under `top/`, as GitHub source archives are.
fn release_tarball(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, format!("{top}/{name}"), content.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_update_from_github_release_rewrites_url() {
    let ws = TestWorkspace::new().unwrap();
    let server = MockServer::start().await;
    let asset_url = format!("{}/download/proj-1.1.tar.gz", server.uri());
    let release = serde_json::json!({
        "tag_name": "v1.1",
        "assets": [{"name": "proj-1.1.tar.gz", "browser_download_url": asset_url.clone()}],
    });
    Mock::given(method("GET"))
        .and(path("/repos/acme/proj/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(release))
        .mount(&server)
        .await;
    let tarball = release_tarball(
        "proj-1.1",
        &[("src.c", "int version = 11;\n"), ("include/proj.h", "#define PROJ 11\n")],
    );
    Mock::given(method("GET"))
        .and(path("/download/proj-1.1.tar.gz"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball))
        .mount(&server)
        .await;

    let old_url = "https://github.com/acme/proj/releases/download/v1.0/proj-1.0.tar.gz";
    let package = ws.root().join("vendor/proj");
    write_package(&package, "v1.0", "ARCHIVE", old_url).unwrap();
    std::fs::write(package.join("src.c"), "int version = 10;\n").unwrap();
    std::fs::write(package.join("Android.bp"), "cc_library { name: \"proj\" }\n").unwrap();
    let config = ws.root().join("vendup.toml");
    std::fs::write(&config, format!("[network]\ngithub_api_url = \"{}\"\n", server.uri())).unwrap();

    ws.vendup()
        .arg("--config")
        .arg(&config)
        .args(["update", "vendor/proj"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1.0 -> v1.1"));

    let read = |name: &str| std::fs::read_to_string(package.join(name)).unwrap();
    assert_eq!(read("src.c"), "int version = 11;\n");
    assert_eq!(read("include/proj.h"), "#define PROJ 11\n");
    assert_eq!(read("Android.bp"), "cc_library { name: \"proj\" }\n");

    let metadata = MetadataStore::load(&package).unwrap();
    assert_eq!(metadata.version, "v1.1");
    assert_eq!(metadata.urls.len(), 1);
    assert_eq!(metadata.urls[0].address, asset_url);
    assert_eq!(ws.siblings(&package), ["proj"]);
}
