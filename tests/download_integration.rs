//! Integration tests for downloads.
//!
//! These tests verify the full download flow with mock HTTP servers: the
//! transport writes to a temporary file, the delegate moves it into place.

use std::sync::{Arc, Mutex};

use fetcher_core::client::{Client, DownloadOptions};
use fetcher_core::config::ClientConfig;
use fetcher_core::dispatch::Progress;
use fetcher_core::request::{ParamValue, Parameters};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to create a mock server with a file endpoint.
async fn setup_mock_file(path_str: &str, content: &[u8]) -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(path_str))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&mock_server)
        .await;

    mock_server
}

fn client() -> Client {
    Client::new(&ClientConfig::default()).expect("client should build")
}

#[tokio::test]
async fn test_download_full_flow_preserves_content() {
    let content = b"This is the complete file content for testing.\nLine 2.\nLine 3.";
    let mock_server = setup_mock_file("/document.pdf", content).await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    let url = format!("{}/document.pdf", mock_server.uri());
    let response = client()
        .download(&url, DownloadOptions::default().destination(temp_dir.path()))
        .await
        .expect("download should succeed");

    let file_path = response.value.as_path().expect("download yields a path");
    assert_eq!(file_path, temp_dir.path().join("document.pdf"));
    assert_eq!(std::fs::read(file_path).unwrap(), content);
}

#[tokio::test]
async fn test_download_uses_content_disposition_filename() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");

    Mock::given(method("GET"))
        .and(path("/api/download"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "Content-Disposition",
                    r#"attachment; filename="important-paper.pdf""#,
                )
                .set_body_bytes(b"PDF bytes"),
        )
        .mount(&mock_server)
        .await;

    let url = format!("{}/api/download", mock_server.uri());
    let response = client()
        .download(&url, DownloadOptions::default().destination(temp_dir.path()))
        .await
        .unwrap();

    assert_eq!(
        response.value.as_path().unwrap().file_name().unwrap(),
        "important-paper.pdf"
    );
}

#[tokio::test]
async fn test_download_collision_gets_numeric_suffix() {
    let mock_server = setup_mock_file("/report.csv", b"a,b\n1,2\n").await;
    let temp_dir = TempDir::new().unwrap();
    std::fs::write(temp_dir.path().join("report.csv"), b"existing").unwrap();

    let url = format!("{}/report.csv", mock_server.uri());
    let response = client()
        .download(&url, DownloadOptions::default().destination(temp_dir.path()))
        .await
        .unwrap();

    assert_eq!(
        response.value.as_path().unwrap(),
        temp_dir.path().join("report_1.csv")
    );
    assert_eq!(
        std::fs::read(temp_dir.path().join("report.csv")).unwrap(),
        b"existing"
    );
}

#[tokio::test]
async fn test_download_404_is_saved_with_its_status() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.pdf"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();

    let url = format!("{}/missing.pdf", mock_server.uri());
    let response = client()
        .download(&url, DownloadOptions::default().destination(temp_dir.path()))
        .await
        .expect("a completed download is not an error");

    assert_eq!(response.head.status, 404);
    assert!(!response.head.is_success());
    let saved = response.value.as_path().unwrap();
    assert_eq!(saved, temp_dir.path().join("missing.pdf"));
    assert_eq!(std::fs::read(saved).unwrap(), b"Not Found");
}

#[tokio::test]
async fn test_download_reports_progress_up_to_content_length() {
    let content = vec![42u8; 256 * 1024];
    let mock_server = setup_mock_file("/large.bin", &content).await;
    let temp_dir = TempDir::new().unwrap();

    let seen: Arc<Mutex<Vec<Progress>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let options = DownloadOptions::default()
        .destination(temp_dir.path())
        .progress(move |progress| sink.lock().unwrap().push(progress));

    let url = format!("{}/large.bin", mock_server.uri());
    let response = client().download(&url, options).await.unwrap();
    assert_eq!(
        std::fs::metadata(response.value.as_path().unwrap()).unwrap().len(),
        content.len() as u64
    );

    let seen = seen.lock().unwrap();
    assert!(!seen.is_empty());
    let last = seen.last().unwrap();
    assert_eq!(last.bytes_so_far, content.len() as u64);
    assert_eq!(last.bytes_expected, Some(content.len() as u64));
    let summed: u64 = seen.iter().map(|p| p.bytes_this_chunk).sum();
    assert_eq!(summed, content.len() as u64);
    assert!(seen.windows(2).all(|w| w[0].bytes_so_far < w[1].bytes_so_far));
}

#[tokio::test]
async fn test_download_uses_configured_directory_and_query() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/export"))
        .and(query_param("format", "csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Disposition", "attachment; filename=export.csv")
                .set_body_string("x\n"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let configured = temp_dir.path().join("downloads");

    let client = Client::new(&ClientConfig {
        base_url: Some(mock_server.uri()),
        download_dir: configured.clone(),
        ..ClientConfig::default()
    })
    .unwrap();
    let mut parameters = Parameters::new();
    parameters.insert("format".into(), ParamValue::from("csv"));
    let response = client
        .download(
            "/export",
            DownloadOptions {
                parameters,
                ..DownloadOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.value.as_path().unwrap(), configured.join("export.csv"));
}
