//! Task registry invariants under concurrency, cancellation and close.

use std::time::Duration;

use fetcher_core::client::Client;
use fetcher_core::config::ClientConfig;
use fetcher_core::error::{CANCELLED_ERROR_CODE, ClientError};
use fetcher_core::request::Parameters;
use futures_util::future::join_all;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fail"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> Client {
    Client::new(&ClientConfig {
        base_url: Some(server.uri()),
        ..ClientConfig::default()
    })
    .expect("client should build")
}

#[tokio::test]
async fn test_registry_empty_after_concurrent_completions() {
    let server = server().await;
    for n in [0usize, 1, 25] {
        let client = client_for(&server);
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let route = if i % 3 == 0 { "/fail" } else { "/ok" };
                client.get(route, Parameters::new())
            })
            .collect();

        let results = join_all(handles).await;

        assert_eq!(results.len(), n);
        let failures = results.iter().filter(|r| r.is_err()).count();
        assert_eq!(failures, n.div_ceil(3));
        assert_eq!(client.pending_tasks().await, 0, "registry leaked with n = {n}");
    }
}

#[tokio::test]
async fn test_cancel_delivers_cancelled_and_evicts() {
    let server = server().await;
    let client = client_for(&server);

    let handle = client.get("/slow", Parameters::new());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.pending_tasks().await, 1);

    handle.cancel();
    let error = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("cancellation should resolve promptly")
        .unwrap_err();

    assert!(matches!(error, ClientError::Cancelled { .. }), "got {error:?}");
    assert_eq!(error.code(), CANCELLED_ERROR_CODE);
    assert_eq!(client.pending_tasks().await, 0);
}

#[tokio::test]
async fn test_close_abandons_in_flight_requests() {
    let server = server().await;
    let client = client_for(&server);

    let slow = client.get("/slow", Parameters::new());
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.close().await;

    let error = tokio::time::timeout(Duration::from_secs(5), slow)
        .await
        .expect("close should resolve outstanding requests")
        .unwrap_err();
    assert!(matches!(error, ClientError::Closed { .. }), "got {error:?}");

    let late = client.get("/ok", Parameters::new()).await.unwrap_err();
    assert!(matches!(late, ClientError::Closed { .. }), "got {late:?}");
    assert_eq!(client.pending_tasks().await, 0);
}

#[tokio::test]
async fn test_clones_share_one_registry() {
    let server = server().await;
    let client = client_for(&server);
    let clone = client.clone();

    let slow = clone.get("/slow", Parameters::new());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.pending_tasks().await, 1);

    slow.cancel();
    let _ = slow.await;
    assert_eq!(client.pending_tasks().await, 0);
}
