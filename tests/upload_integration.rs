//! Integration tests for uploads from bytes, files and streams.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use fetcher_core::auth::Credential;
use fetcher_core::client::{Client, RequestOptions, UploadOptions, UploadPayload};
use fetcher_core::config::ClientConfig;
use fetcher_core::dispatch::Progress;
use fetcher_core::error::ClientError;
use fetcher_core::request::{Method, ParamValue, Parameters};
use fetcher_core::transport::BodyStream;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> Client {
    Client::new(&ClientConfig {
        base_url: Some(server.uri()),
        ..ClientConfig::default()
    })
    .expect("client should build")
}

fn recorder() -> (Arc<Mutex<Vec<Progress>>>, impl Fn(Progress) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |progress: Progress| sink.lock().unwrap().push(progress))
}

#[tokio::test]
async fn test_upload_bytes_with_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/blobs"))
        .and(query_param("name", "blob.bin"))
        .and(header("content-type", "application/octet-stream"))
        .and(body_bytes(b"raw payload".to_vec()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"stored": 11})))
        .expect(1)
        .mount(&server)
        .await;

    let mut parameters = Parameters::new();
    parameters.insert("name".into(), ParamValue::from("blob.bin"));
    let (seen, hook) = recorder();
    let response = client_for(&server)
        .upload(
            "/blobs",
            UploadPayload::Bytes(Bytes::from_static(b"raw payload")),
            UploadOptions {
                parameters,
                ..UploadOptions::default()
            }
            .progress(hook),
        )
        .await
        .unwrap();

    assert_eq!(response.value.as_json().unwrap()["stored"], 11);
    let seen = seen.lock().unwrap();
    let last = seen.last().expect("progress reported");
    assert_eq!(last.bytes_so_far, 11);
    assert_eq!(last.bytes_expected, Some(11));
}

#[tokio::test]
async fn test_upload_file_with_put() {
    let server = MockServer::start().await;
    let content = vec![3u8; 150 * 1024];
    Mock::given(method("PUT"))
        .and(path("/files/data.bin"))
        .and(body_bytes(content.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("data.bin");
    std::fs::write(&file, &content).unwrap();

    let (seen, hook) = recorder();
    let response = client_for(&server)
        .upload(
            "/files/data.bin",
            UploadPayload::File(file),
            UploadOptions {
                method: Method::Put,
                ..UploadOptions::default()
            }
            .progress(hook),
        )
        .await
        .unwrap();

    assert_eq!(response.value.as_json().unwrap()["ok"], true);
    let seen = seen.lock().unwrap();
    assert!(seen.len() > 1, "a 150 KiB file is sent in several chunks");
    assert_eq!(seen.last().unwrap().bytes_so_far, content.len() as u64);
}

#[tokio::test]
async fn test_upload_missing_file_is_filesystem_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let error = client_for(&server)
        .upload(
            "/files",
            UploadPayload::File("/definitely/not/here.bin".into()),
            UploadOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(error, ClientError::Filesystem { .. }), "got {error:?}");
}

#[tokio::test]
async fn test_upload_stream_is_supplied_on_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/stream"))
        .and(body_bytes(b"chunk-one|chunk-two".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_string("received"))
        .expect(1)
        .mount(&server)
        .await;

    let payload = UploadPayload::stream(|| {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"chunk-one|")),
            Ok(Bytes::from_static(b"chunk-two")),
        ];
        let stream: BodyStream = Box::pin(futures_util::stream::iter(chunks));
        stream
    });

    let response = client_for(&server)
        .upload(
            "/stream",
            payload,
            UploadOptions {
                request: RequestOptions::default()
                    .format(fetcher_core::response::ResponseFormat::Text),
                ..UploadOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.value.as_text(), Some("received"));
}

fn payload_stream() -> UploadPayload {
    UploadPayload::stream(|| {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            vec![Ok(Bytes::from_static(b"PAY")), Ok(Bytes::from_static(b"LOAD"))];
        Box::pin(futures_util::stream::iter(chunks)) as BodyStream
    })
}

#[tokio::test]
async fn test_stream_upload_is_resent_after_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/private"))
        .and(header("authorization", "Basic YW5uOnNlY3JldA=="))
        .and(body_bytes(b"PAYLOAD".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"stored": 7})))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/private"))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="files""#),
        )
        .mount(&server)
        .await;

    let response = client_for(&server)
        .upload(
            "/private",
            payload_stream(),
            UploadOptions {
                request: RequestOptions::default().credential(Credential::new("ann", "secret")),
                ..UploadOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.value.as_json().unwrap()["stored"], 7);
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].body, b"PAYLOAD");
    assert_eq!(requests[1].body, b"PAYLOAD");
}

#[tokio::test]
async fn test_stream_upload_is_resent_on_307() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(307).insert_header("Location", "/new"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/new"))
        .and(body_bytes(b"PAYLOAD".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .upload(
            "/old",
            payload_stream(),
            UploadOptions {
                method: Method::Put,
                ..UploadOptions::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.value.as_json().unwrap()["ok"], true);
}

#[tokio::test]
async fn test_declared_content_length_is_sent_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/blobs"))
        .and(body_bytes(b"PAYLOAD".to_vec()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .upload(
            "/blobs",
            UploadPayload::Bytes(Bytes::from_static(b"PAYLOAD")),
            UploadOptions {
                request: RequestOptions::default().header("Content-Length", "7"),
                ..UploadOptions::default()
            },
        )
        .await
        .unwrap();

    let request = &server.received_requests().await.unwrap()[0];
    let lengths: Vec<_> = request.headers.get_all("content-length").iter().collect();
    assert_eq!(lengths.len(), 1);
    assert_eq!(lengths[0].to_str().unwrap(), "7");
}
