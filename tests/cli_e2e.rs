//! End-to-end CLI tests for the tomefetch binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Binary command isolated from the user's config file.
fn tomefetch(config_home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tomefetch").unwrap();
    cmd.env("XDG_CONFIG_HOME", config_home.path())
        .env_remove("RUST_LOG");
    cmd
}

async fn mount_manifest(server: &MockServer) {
    let manifest = serde_json::json!({
        "id": 42,
        "title": "Cli Book",
        "chapters": [
            {
                "id": 1,
                "number": 1,
                "pages": [
                    { "id": 1, "url": "pages/1.png" },
                    { "id": 2, "url": "pages/2.png" }
                ]
            }
        ]
    });
    Mock::given(method("GET"))
        .and(path("/book.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(manifest))
        .mount(server)
        .await;
    for n in 1..=2 {
        Mock::given(method("GET"))
            .and(path(format!("/pages/{n}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("page {n}")))
            .mount(server)
            .await;
    }
}

#[test]
fn test_binary_help_displays_usage() {
    let config = TempDir::new().unwrap();
    tomefetch(&config)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Download a work item"))
        .stdout(predicate::str::contains("--chapter"));
}

#[test]
fn test_binary_version_displays_version() {
    let config = TempDir::new().unwrap();
    tomefetch(&config)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tomefetch"));
}

#[test]
fn test_binary_missing_url_returns_error() {
    let config = TempDir::new().unwrap();
    tomefetch(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("MANIFEST_URL"));
}

#[test]
fn test_binary_invalid_config_file_returns_error() {
    let config = TempDir::new().unwrap();
    let file = config.path().join("bad.toml");
    std::fs::write(&file, "max_concurrent_jobs = 99\n").unwrap();
    tomefetch(&config)
        .args(["--config", file.to_str().unwrap(), "http://127.0.0.1:9/book.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("max_concurrent_jobs"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_downloads_manifest_into_archive() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;
    let config = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let url = format!("{}/book.json", server.uri());
    let out_dir = out.path().to_path_buf();

    let assert = tokio::task::spawn_blocking(move || {
        tomefetch(&config)
            .args(["-q", "-o", out_dir.to_str().unwrap(), url.as_str()])
            .assert()
    })
    .await
    .unwrap();

    let archive = out.path().join("Cli_Book_42.cbz");
    assert
        .success()
        .stdout(predicate::str::contains(archive.to_str().unwrap()));
    assert!(archive.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_unknown_chapter_exits_with_failure() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;
    let config = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let url = format!("{}/book.json", server.uri());
    let out_dir = out.path().to_path_buf();

    let assert = tokio::task::spawn_blocking(move || {
        tomefetch(&config)
            .args(["-o", out_dir.to_str().unwrap(), "-c", "99", url.as_str()])
            .assert()
    })
    .await
    .unwrap();

    assert
        .code(1)
        .stderr(predicate::str::contains("requested chapters not found"));
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_unreachable_manifest_exits_with_failure() {
    let server = MockServer::start().await;
    let config = TempDir::new().unwrap();
    let url = format!("{}/missing.json", server.uri());

    let assert = tokio::task::spawn_blocking(move || tomefetch(&config).args(["-q", url.as_str()]).assert())
        .await
        .unwrap();

    assert
        .failure()
        .stderr(predicate::str::contains("cannot load manifest"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_verbose_run_ends_progress_ui_cleanly() {
    let server = MockServer::start().await;
    mount_manifest(&server).await;
    let config = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let url = format!("{}/book.json", server.uri());
    let out_dir = out.path().to_path_buf();

    let assert = tokio::task::spawn_blocking(move || {
        tomefetch(&config)
            .args(["-v", "-o", out_dir.to_str().unwrap(), url.as_str()])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stderr(predicate::str::contains("state published"))
        .stderr(predicate::str::contains("progress ui task ended abnormally").not());
}
