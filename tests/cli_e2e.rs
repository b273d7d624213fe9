//! End-to-end CLI tests for the fetcher binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Issue an HTTP request"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("fetcher"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that the method and URL are required.
#[test]
fn test_binary_missing_arguments_returns_error() {
    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_post_prints_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(body_string("name=a&tags%5B%5D=x&tags%5B%5D=y"))
        .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"id":7}"#))
        .expect(1)
        .mount(&server)
        .await;

    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.args([
        "-q",
        "POST",
        &format!("{}/items", server.uri()),
        "-d",
        "name=a",
        "-d",
        "tags[]=x",
        "-d",
        "tags[]=y",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("\"id\": 7"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_download_prints_saved_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/notes.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.args(["-q", "GET", &format!("{}/notes.txt", server.uri()), "--download"])
        .arg(temp_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("notes.txt"));

    assert_eq!(
        std::fs::read_to_string(temp_dir.path().join("notes.txt")).unwrap(),
        "hello"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_error_status_exits_non_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.args(["-q", "GET", &format!("{}/missing", server.uri())])
        .assert()
        .failure()
        .stderr(predicate::str::contains("404"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_binary_download_error_status_exits_non_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone.txt"))
        .respond_with(ResponseTemplate::new(410).set_body_string("gone"))
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("fetcher").unwrap();
    cmd.args(["-q", "GET", &format!("{}/gone.txt", server.uri()), "--download"])
        .arg(temp_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 410"));
}
