//! End-to-end tests of the ticket service and its client on a local port.

use futures::TryStreamExt;
use kiln_dispatch::{
    ClientConfig, DispatchError, PollOptions, SequenceClient, ServerConfig, TicketServer, URL_FILE,
};
use pretty_assertions::assert_eq;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Running {
    client: SequenceClient,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), DispatchError>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

async fn start(data_dir: &Path) -> Running {
    let config = ServerConfig { data_dir: data_dir.to_path_buf(), ..ServerConfig::default() };
    let server = TicketServer::open(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.serve_on(listener, shutdown.clone()));

    let poll = PollOptions { interval: Duration::from_millis(20), max_wait: Some(Duration::from_secs(5)) };
    let client =
        SequenceClient::from_url_file(&data_dir.join(URL_FILE), &poll, &ClientConfig::default(), &shutdown)
            .await
            .unwrap();
    Running { client, shutdown, handle }
}

#[tokio::test]
async fn test_connect_and_consume_everything() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path()).await;
    assert!(running.client.connect().await.unwrap());

    let items = vec!["a", "b", "c", "d"];
    let consumed: Vec<&&str> = running
        .client
        .consume("train", &items, CancellationToken::new())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(consumed, vec![&"a", &"b", &"c", &"d"]);
    assert_eq!(running.client.assign("train", 4).await.unwrap(), None);
    running.stop().await;
}

#[tokio::test]
async fn test_clients_get_distinct_indices() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path()).await;
    let other = SequenceClient::new(running.client.url()).unwrap();

    assert_eq!(running.client.assign("case", 3).await.unwrap(), Some(0));
    assert_eq!(other.assign("case", 3).await.unwrap(), Some(1));
    running.client.complete("case", 0).await.unwrap();
    assert_eq!(other.assign("case", 3).await.unwrap(), Some(2));
    assert_eq!(running.client.assign("case", 3).await.unwrap(), None);

    running.stop().await;
}

#[tokio::test]
async fn test_protocol_errors_are_remote_failures() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path()).await;
    let client = &running.client;

    client.assign("case", 2).await.unwrap();
    let status = |err: DispatchError| match err {
        DispatchError::RemoteFailure { status, .. } => status,
        other => panic!("expected a remote failure, got {other:?}"),
    };

    assert_eq!(status(client.assign("case", 5).await.unwrap_err()), Some(409));
    assert_eq!(status(client.complete("missing", 0).await.unwrap_err()), Some(404));
    assert_eq!(status(client.complete("case", 2).await.unwrap_err()), Some(422));

    running.stop().await;
}

#[tokio::test]
async fn test_cancelled_consumption_completes_pending_index() {
    let temp = TempDir::new().unwrap();
    let running = start(temp.path()).await;
    let cancel = CancellationToken::new();
    let items = [10, 20, 30];

    {
        let stream = running.client.consume("eval", &items, cancel.clone());
        futures::pin_mut!(stream);
        assert_eq!(stream.try_next().await.unwrap(), Some(&10));
        cancel.cancel();
        assert_eq!(stream.try_next().await.unwrap(), None);
    }

    // Index 0 was completed, so the next worker picks up 1.
    assert_eq!(running.client.assign("eval", 3).await.unwrap(), Some(1));
    running.stop().await;
}

#[tokio::test]
async fn test_progress_survives_restart() {
    let temp = TempDir::new().unwrap();

    let running = start(temp.path()).await;
    assert_eq!(running.client.assign("case", 2).await.unwrap(), Some(0));
    running.client.complete("case", 0).await.unwrap();
    running.stop().await;
    assert!(!temp.path().join(URL_FILE).exists());

    let running = start(temp.path()).await;
    assert_eq!(running.client.assign("case", 2).await.unwrap(), Some(1));
    running.stop().await;
}

#[tokio::test]
async fn test_url_file_wait_times_out() {
    let temp = TempDir::new().unwrap();
    let poll = PollOptions { interval: Duration::from_millis(10), max_wait: Some(Duration::from_millis(50)) };

    let err = SequenceClient::from_url_file(
        &temp.path().join(URL_FILE),
        &poll,
        &ClientConfig::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DispatchError::UrlFileTimeout { .. }));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let poll = PollOptions { interval: Duration::from_secs(60), max_wait: None };
    let err = SequenceClient::from_url_file(&temp.path().join(URL_FILE), &poll, &ClientConfig::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Cancelled));
}
