// tests/stream_client_tests.rs
//
// The stream client against a local websocket server: reconnect pacing,
// auth rejection handling and credential renewal.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

use livespot_common::models::{AuthMethod, Credential};
use livespot_core::auth::{CredentialBroker, CredentialSource};
use livespot_core::platforms::stripchat::{StreamClient, StreamClientConfig, StreamTarget};
use livespot_core::retry::{RetryConfig, RetryTracker};
use livespot_core::Error;

const RETRY_KEY: &str = "stream:alice";

/// What the server does with the n-th connection.
#[derive(Debug, Clone, Copy)]
enum Behaviour {
    /// Sends a heartbeat, then keeps the socket open.
    Hold,
    /// Never sends anything.
    Silent,
    Close(u16),
}

struct Server {
    url: String,
    connections: Arc<AtomicUsize>,
}

impl Server {
    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

async fn serve(script: fn(usize) -> Behaviour) -> Server {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = connections.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(handle(tcp, script(n)));
        }
    });
    Server { url, connections }
}

async fn handle(tcp: TcpStream, behaviour: Behaviour) {
    let Ok(mut ws) = accept_async(tcp).await else { return };
    match behaviour {
        Behaviour::Hold => {
            let _ = ws.send(Message::Text("{}".into())).await;
        }
        Behaviour::Silent => {}
        Behaviour::Close(code) => {
            let frame = CloseFrame { code: CloseCode::from(code), reason: "bye".into() };
            let _ = ws.send(Message::Close(Some(frame))).await;
        }
    }
    while let Some(Ok(_)) = ws.next().await {}
}

/// Hands out credentials for the local server and counts acquisitions.
struct CountingSource {
    url: String,
    ttl_secs: i64,
    calls: AtomicUsize,
}

impl CountingSource {
    fn new(url: &str, ttl_secs: i64) -> Arc<Self> {
        Arc::new(Self { url: url.to_string(), ttl_secs, calls: AtomicUsize::new(0) })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialSource for CountingSource {
    fn method(&self) -> AuthMethod {
        AuthMethod::RestApi
    }

    async fn acquire(&self, _model: &str) -> Result<Credential, Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential {
            jwt: format!("jwt-{}", n),
            cf_clearance: "cf".to_string(),
            ws_url: self.url.clone(),
            user_id: String::new(),
            expires_at: Utc::now().timestamp() + self.ttl_secs,
            method: Some(AuthMethod::RestApi),
            acquired_at: Utc::now(),
            refresh_count: 0,
        })
    }
}

fn fast_config() -> StreamClientConfig {
    StreamClientConfig {
        handshake_timeout: Duration::from_millis(200),
        ..StreamClientConfig::default()
    }
}

fn retry(base_ms: u64, max_ms: u64) -> RetryTracker {
    RetryTracker::new(RetryConfig {
        max_retries: 5,
        base_delay: Duration::from_millis(base_ms),
        max_delay: Duration::from_millis(max_ms),
    })
}

/// Runs a client for `alice` for `run_for`, then shuts it down.
async fn run_client(source: Arc<CountingSource>, retry: RetryTracker, config: StreamClientConfig, run_for: Duration) {
    let sources: Vec<Arc<dyn CredentialSource>> = vec![source];
    let broker = Arc::new(CredentialBroker::new(sources, None, "alice"));
    let (events_tx, _events_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let client = StreamClient::new(
        StreamTarget { cast_name: "alice".to_string(), model_id: "42".to_string() },
        broker,
        retry,
        events_tx,
        config,
    );
    let handle = tokio::spawn(client.run(shutdown_rx));

    tokio::time::sleep(run_for).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("client stops on shutdown")
        .unwrap();
}

#[tokio::test]
async fn short_lived_credential_does_not_spin() {
    let server = serve(|_| Behaviour::Hold).await;
    // 100s left is already inside the 300s refresh margin.
    let source = CountingSource::new(&server.url, 100);

    run_client(source.clone(), retry(20, 200), fast_config(), Duration::from_secs(1)).await;

    assert_eq!(source.calls(), 1);
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn rejected_token_is_invalidated_and_refreshed() {
    let server = serve(|n| if n == 0 { Behaviour::Close(3501) } else { Behaviour::Hold }).await;
    let source = CountingSource::new(&server.url, 3600);

    run_client(source.clone(), retry(20, 200), fast_config(), Duration::from_millis(500)).await;

    assert_eq!(source.calls(), 2);
    assert_eq!(server.connections(), 2);
}

#[tokio::test]
async fn auth_rejections_refresh_once_per_debounce_window() {
    let server = serve(|_| Behaviour::Close(3501)).await;
    let source = CountingSource::new(&server.url, 3600);

    run_client(source.clone(), retry(20, 200), fast_config(), Duration::from_millis(600)).await;

    assert!(server.connections() >= 3, "connections: {}", server.connections());
    // Initial acquisition plus a single refresh inside the 10s window.
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn silent_server_times_out_and_reconnects() {
    let server = serve(|_| Behaviour::Silent).await;
    let source = CountingSource::new(&server.url, 3600);
    let config = StreamClientConfig { handshake_timeout: Duration::from_millis(100), ..fast_config() };

    run_client(source.clone(), retry(20, 200), config, Duration::from_millis(600)).await;

    assert!(server.connections() >= 2, "connections: {}", server.connections());
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn closed_connections_back_off_exponentially() {
    let server = serve(|_| Behaviour::Close(1000)).await;
    let source = CountingSource::new(&server.url, 3600);
    let tracker = retry(100, 1000);

    run_client(source.clone(), tracker.clone(), fast_config(), Duration::from_millis(600)).await;

    // Reconnects at roughly 0, 120ms and 360ms; the next would be near 850ms.
    let connections = server.connections();
    assert!((2..=4).contains(&connections), "connections: {}", connections);
    assert!(tracker.failure_count(RETRY_KEY) >= 2);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn credential_is_renewed_before_expiry() {
    let server = serve(|_| Behaviour::Hold).await;
    // Two seconds outside the margin: the client reconnects proactively.
    let source = CountingSource::new(&server.url, 302);

    run_client(source.clone(), retry(20, 200), fast_config(), Duration::from_millis(3500)).await;

    assert!(source.calls() >= 2, "calls: {}", source.calls());
    assert!(server.connections() >= 2, "connections: {}", server.connections());
}
