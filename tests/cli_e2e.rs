//! End-to-end CLI tests for the segmerge binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A command isolated from the user's config and log settings.
fn segmerge(config_home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("segmerge").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env_remove("RUST_LOG");
    cmd
}

fn write_manifest(dir: &Path, body: &str) -> String {
    let manifest = dir.join("manifest.json");
    std::fs::write(&manifest, body).unwrap();
    manifest.display().to_string()
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let temp = TempDir::new().unwrap();
    segmerge(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Fetch media segments"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let temp = TempDir::new().unwrap();
    segmerge(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("segmerge"));
}

/// Test that running without inputs is a usage error.
#[test]
fn test_binary_requires_inputs() {
    let temp = TempDir::new().unwrap();
    segmerge(temp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

/// Test that an invalid merge mode is rejected before any work.
#[test]
fn test_binary_rejects_invalid_merge_mode() {
    let temp = TempDir::new().unwrap();
    segmerge(temp.path())
        .args(["--merge-mode", "diagonal", "whatever.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid merge mode"));
}

/// Test that a run where nothing resolves exits with code 1.
#[test]
fn test_binary_nothing_resolved_is_fatal() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing.json");
    segmerge(temp.path())
        .arg(missing.as_os_str())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("could be resolved"));
}

/// Test that an invalid config file exits with code 1.
#[test]
fn test_binary_invalid_config_is_fatal() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("bad.toml");
    std::fs::write(&config, "max_parallelism = 0\n").unwrap();
    let manifest = write_manifest(temp.path(), r#"{"titles":[]}"#);

    segmerge(temp.path())
        .arg("--config")
        .arg(config.as_os_str())
        .arg(manifest)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_parallelism"));
}

/// Test that a fully successful run exits 0 and reports the artifact.
#[tokio::test(flavor = "multi_thread")]
async fn test_binary_successful_run_exits_zero() {
    let server = MockServer::start().await;
    for (route, body) in [("/a.ts", "AA"), ("/b.ts", "BB")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }

    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let uri = server.uri();
    let manifest = write_manifest(
        temp.path(),
        &format!(r#"{{"titles":[{{"title":"Ep 1","segments":["{uri}/a.ts","{uri}/b.ts"]}}]}}"#),
    );

    segmerge(temp.path())
        .arg("-q")
        .arg("--no-remux")
        .arg("-o")
        .arg(out.as_os_str())
        .arg(manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("merged"))
        .stdout(predicate::str::contains("Ep-1"));

    assert_eq!(std::fs::read(out.join("Ep-1.ts")).unwrap(), b"AABB");
}

/// Test that a permanently failed segment exits with code 2.
#[tokio::test(flavor = "multi_thread")]
async fn test_binary_partial_failure_exits_two() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.ts"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let out = temp.path().join("out");
    let uri = server.uri();
    let manifest = write_manifest(
        temp.path(),
        &format!(r#"{{"titles":[{{"title":"show","segments":["{uri}/ok.ts","{uri}/gone.ts"]}}]}}"#),
    );

    segmerge(temp.path())
        .args(["-q", "--no-remux", "-r", "0", "--skip-incomplete", "-o"])
        .arg(out.as_os_str())
        .arg(manifest)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("incomplete"))
        .stdout(predicate::str::contains("segment 1 failed"));

    assert!(!out.join("show.ts").exists());
}
