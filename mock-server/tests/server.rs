//! Raw-socket tests for the mock server's challenge and truncation behavior.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use mock_server::{AuthKind, Behavior, Metrics, ServerConfig, PASSWORD, USER};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn start(auth: AuthKind, behavior: Behavior) -> (std::net::SocketAddr, Arc<Metrics>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let metrics = Arc::new(Metrics::default());
    let config = ServerConfig { auth, behavior };
    tokio::spawn(mock_server::run(listener, config, Arc::clone(&metrics)));
    (addr, metrics)
}

async fn roundtrip(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn unauthenticated_request_gets_basic_challenge() {
    let (addr, metrics) = start(AuthKind::Basic, Behavior::Normal).await;
    let response = roundtrip(addr, "GET / HTTP/1.1\r\nHost: t\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 401"));
    assert!(response.contains(r#"WWW-Authenticate: Basic realm="MyRealm""#));
    assert_eq!(metrics.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unauthenticated_request_gets_digest_challenge_with_nonce() {
    let (addr, _metrics) = start(AuthKind::Digest, Behavior::Normal).await;
    let response = roundtrip(addr, "GET / HTTP/1.1\r\nHost: t\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 401"));
    assert!(response.contains("WWW-Authenticate: Digest realm=\"MyRealm\", nonce=\""));
    assert!(response.contains("qop=\"auth\""));
}

#[tokio::test]
async fn valid_basic_credentials_are_accepted() {
    let (addr, _metrics) = start(AuthKind::Basic, Behavior::Normal).await;
    let token = BASE64_STANDARD.encode(format!("{USER}:{PASSWORD}"));
    let request = format!("GET / HTTP/1.1\r\nHost: t\r\nAuthorization: Basic {token}\r\n\r\n");
    let response = roundtrip(addr, &request).await;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("Content-Length: 0"));
}

#[tokio::test]
async fn wrong_basic_credentials_are_rechallenged() {
    let (addr, _metrics) = start(AuthKind::Basic, Behavior::Normal).await;
    let token = BASE64_STANDARD.encode(format!("{USER}:wrong"));
    let request = format!("GET / HTTP/1.1\r\nHost: t\r\nAuthorization: Basic {token}\r\n\r\n");
    let response = roundtrip(addr, &request).await;

    assert!(response.starts_with("HTTP/1.1 401"));
}

#[tokio::test]
async fn x_content_response_is_truncated_by_one_byte() {
    let (addr, _metrics) = start(AuthKind::Basic, Behavior::Normal).await;
    let token = BASE64_STANDARD.encode(format!("{USER}:{PASSWORD}"));
    let request = format!(
        "GET / HTTP/1.1\r\nHost: t\r\nAuthorization: Basic {token}\r\nX-Content: Test\r\n\r\n"
    );
    let response = roundtrip(addr, &request).await;

    // Declares the full four bytes but delivers only "est".
    assert!(response.contains("Content-Length: 4"));
    assert!(response.ends_with("\r\n\r\nest"));
}

#[tokio::test]
async fn empty_x_content_declares_zero_and_delivers_zero() {
    let (addr, _metrics) = start(AuthKind::Basic, Behavior::Normal).await;
    let token = BASE64_STANDARD.encode(format!("{USER}:{PASSWORD}"));
    let request = format!(
        "GET / HTTP/1.1\r\nHost: t\r\nAuthorization: Basic {token}\r\nX-Content:\r\n\r\n"
    );
    let response = roundtrip(addr, &request).await;

    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.ends_with("Content-Length: 0\r\n\r\n"));
}

#[tokio::test]
async fn garbled_challenge_mode_sends_unparseable_header() {
    let (addr, _metrics) = start(AuthKind::Basic, Behavior::GarbledChallenge).await;
    let response = roundtrip(addr, "GET / HTTP/1.1\r\nHost: t\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 401"));
    assert!(response.contains("WWW-Authenticate: Bogus ???"));
}

#[tokio::test]
async fn never_respond_counts_client_aborts() {
    let (addr, metrics) = start(AuthKind::Basic, Behavior::NeverRespond).await;
    let token = BASE64_STANDARD.encode(format!("{USER}:{PASSWORD}"));
    let request = format!("GET / HTTP/1.1\r\nHost: t\r\nAuthorization: Basic {token}\r\n\r\n");

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    drop(stream);

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(metrics.aborted.load(Ordering::SeqCst), 1);
}
