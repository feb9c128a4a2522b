//! Client behavior against a mocked ticket service.

use kiln_dispatch::{ClientConfig, DispatchError, SequenceClient};
use mockito::Matcher;
use pretty_assertions::assert_eq;
use std::time::Duration;

#[tokio::test]
async fn test_assign_sends_case_and_length() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/assign")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("case_name".into(), "train run".into()),
            Matcher::UrlEncoded("seq".into(), "12".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("7")
        .create_async()
        .await;

    let client = SequenceClient::new(server.url()).unwrap();
    assert_eq!(client.assign("train run", 12).await.unwrap(), Some(7));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_assign_null_means_done() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server.mock("GET", "/assign").match_query(Matcher::Any).with_body("null").create_async().await;

    let client = SequenceClient::new(format!("{}/", server.url())).unwrap();
    assert_eq!(client.assign("case", 3).await.unwrap(), None);
}

#[tokio::test]
async fn test_complete_sends_form() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/complete")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("case_name".into(), "case".into()),
            Matcher::UrlEncoded("index".into(), "4".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;

    let client = SequenceClient::new(server.url()).unwrap();
    client.complete("case", 4).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_status_is_fatal() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("PUT", "/complete")
        .with_status(500)
        .with_body("ledger unavailable")
        .expect(1)
        .create_async()
        .await;

    let client = SequenceClient::new(server.url()).unwrap();
    match client.complete("case", 0).await {
        Err(DispatchError::RemoteFailure { status, message, .. }) => {
            assert_eq!(status, Some(500));
            assert_eq!(message, "ledger unavailable");
        }
        other => panic!("expected a remote failure, got {other:?}"),
    }
    // No retry.
    mock.assert_async().await;
}

#[tokio::test]
async fn test_malformed_assign_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock =
        server.mock("GET", "/assign").match_query(Matcher::Any).with_body("{\"index\": 1}").create_async().await;

    let client = SequenceClient::new(server.url()).unwrap();
    assert!(matches!(
        client.assign("case", 2).await,
        Err(DispatchError::RemoteFailure { status: None, .. })
    ));
}

#[tokio::test]
async fn test_connect_reports_readiness() {
    let mut server = mockito::Server::new_async().await;
    let _ok = server.mock("GET", "/").with_status(200).with_body("{}").create_async().await;
    let client = SequenceClient::new(server.url()).unwrap();
    assert!(client.connect().await.unwrap());

    let mut down = mockito::Server::new_async().await;
    let _unavailable = down.mock("GET", "/").with_status(503).create_async().await;
    let client = SequenceClient::new(down.url()).unwrap();
    assert!(!client.connect().await.unwrap());
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let config = ClientConfig { request_timeout: Duration::from_millis(500) };
    let client = SequenceClient::with_config("http://127.0.0.1:9", &config).unwrap();
    assert!(matches!(client.connect().await, Err(DispatchError::Transport(_))));
}
