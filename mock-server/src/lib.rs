//! Raw TCP test server for the client core's auth and timeout behavior.
//!
//! # Design
//! The interesting server behaviors — declaring a `Content-Length` larger
//! than the body actually written, then closing the socket, or holding a
//! connection open without ever answering — are exactly the things a
//! well-behaved HTTP framework refuses to emit, so this server speaks
//! HTTP/1.1 by hand over `TcpStream`. Its auth logic mirrors a
//! Basic/Digest-protected realm: requests without valid credentials get a
//! 401 challenge; the digest verifier recomputes the expected response
//! from the stored password. The MD5 arithmetic is deliberately duplicated
//! from the core rather than imported, so drift between the two shows up
//! in integration tests.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use md5::{Digest as _, Md5};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

/// Principal every test authenticates as.
pub const USER: &str = "user";
/// Password for [`USER`].
pub const PASSWORD: &str = "admin";
/// Realm name issued in challenges.
pub const REALM: &str = "MyRealm";

/// Which challenge the server issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    Basic,
    Digest,
}

/// How the server treats authorized requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// `X-Content: s` requests are answered with `Content-Length: s.len()`
    /// but only `s[1..]` written before the socket is shut down. Requests
    /// without the header get an empty 200.
    Normal,
    /// Read the request, then hold the connection open without answering.
    NeverRespond,
    /// Answer 401 with an unparseable `WWW-Authenticate` value.
    GarbledChallenge,
}

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub auth: AuthKind,
    pub behavior: Behavior,
}

/// Counters shared with tests.
#[derive(Debug, Default)]
pub struct Metrics {
    /// TCP connections accepted.
    pub connections: AtomicUsize,
    /// Request heads parsed.
    pub requests: AtomicUsize,
    /// Total bytes received from clients.
    pub bytes_in: AtomicU64,
    /// Connections the client abandoned while the server was holding them.
    pub aborted: AtomicUsize,
}

/// Accept loop. Each connection is served until the peer goes away.
pub async fn run(
    listener: TcpListener,
    config: ServerConfig,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        metrics.connections.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%peer, "accepted");
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(err) = serve_connection(stream, config, metrics).await {
                tracing::debug!(%peer, %err, "connection ended");
            }
        });
    }
}

async fn serve_connection(
    mut stream: TcpStream,
    config: ServerConfig,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    loop {
        let head = match read_request_head(&mut stream, &mut buf, &metrics).await? {
            Some(head) => head,
            None => return Ok(()),
        };
        metrics.requests.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(method = %head.method, path = %head.path, "request");

        if config.behavior == Behavior::GarbledChallenge {
            write_response(
                &mut stream,
                401,
                "Unauthorized",
                &[("WWW-Authenticate", "Bogus ???")],
                b"",
            )
            .await?;
            continue;
        }

        if !authorized(&head, config.auth) {
            let challenge = match config.auth {
                AuthKind::Basic => format!(r#"Basic realm="{REALM}""#),
                AuthKind::Digest => format!(
                    r#"Digest realm="{REALM}", nonce="{}", qop="auth", algorithm=MD5, opaque="{}""#,
                    Uuid::new_v4().simple(),
                    Uuid::new_v4().simple(),
                ),
            };
            tracing::debug!("challenging");
            write_response(
                &mut stream,
                401,
                "Unauthorized",
                &[("WWW-Authenticate", &challenge)],
                b"",
            )
            .await?;
            continue;
        }

        match config.behavior {
            Behavior::NeverRespond => {
                // Hold the connection; record when the client forces it shut.
                let mut sink = [0u8; 256];
                loop {
                    match stream.read(&mut sink).await {
                        Ok(0) | Err(_) => {
                            metrics.aborted.fetch_add(1, Ordering::SeqCst);
                            return Ok(());
                        }
                        Ok(n) => {
                            metrics.bytes_in.fetch_add(n as u64, Ordering::SeqCst);
                        }
                    }
                }
            }
            Behavior::Normal | Behavior::GarbledChallenge => {
                if let Some(content) = head.header("x-content") {
                    // Declare the full length, deliver one byte less. An
                    // empty value declares zero and delivers zero.
                    let declared = content.len();
                    let short = content.as_bytes().get(1..).unwrap_or_default();
                    let head_bytes = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {declared}\r\n\r\n"
                    );
                    stream.write_all(head_bytes.as_bytes()).await?;
                    stream.write_all(short).await?;
                    stream.flush().await?;
                    stream.shutdown().await?;
                    tracing::debug!(declared, written = short.len(), "truncated body");
                    return Ok(());
                }
                write_response(&mut stream, 200, "OK", &[], b"").await?;
            }
        }
    }
}

struct RequestHead {
    method: String,
    path: String,
    headers: Vec<(String, String)>,
}

impl RequestHead {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn read_request_head(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    metrics: &Metrics,
) -> std::io::Result<Option<RequestHead>> {
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let raw = buf[..end].to_vec();
            buf.drain(..end + 4);
            return Ok(Some(parse_request_head(&raw)?));
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        metrics.bytes_in.fetch_add(n as u64, Ordering::SeqCst);
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn parse_request_head(raw: &[u8]) -> std::io::Result<RequestHead> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "non-utf8 request"))?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    Ok(RequestHead {
        method,
        path,
        headers,
    })
}

fn authorized(head: &RequestHead, auth: AuthKind) -> bool {
    let Some(value) = head.header("authorization") else {
        return false;
    };
    match auth {
        AuthKind::Basic => {
            let expected = BASE64_STANDARD.encode(format!("{USER}:{PASSWORD}"));
            value == format!("Basic {expected}")
        }
        AuthKind::Digest => verify_digest(value, &head.method),
    }
}

/// Recompute the expected digest response from the stored password and
/// compare against the client's. The uri comes from the auth header, as
/// sent by the client.
fn verify_digest(value: &str, method: &str) -> bool {
    let Some(params) = value.strip_prefix("Digest ") else {
        return false;
    };
    let get = |name: &str| {
        params.split(',').find_map(|part| {
            let (k, v) = part.trim().split_once('=')?;
            (k.trim() == name).then(|| v.trim().trim_matches('"').to_string())
        })
    };
    let (Some(username), Some(realm), Some(nonce), Some(uri), Some(response)) = (
        get("username"),
        get("realm"),
        get("nonce"),
        get("uri"),
        get("response"),
    ) else {
        return false;
    };
    if username != USER {
        return false;
    }

    let md5_hex = |s: &str| hex::encode(Md5::digest(s.as_bytes()));
    let ha1 = md5_hex(&format!("{username}:{realm}:{PASSWORD}"));
    let ha2 = md5_hex(&format!("{method}:{uri}"));
    let expected = match (get("qop"), get("nc"), get("cnonce")) {
        (Some(qop), Some(nc), Some(cnonce)) if qop == "auth" => {
            md5_hex(&format!("{ha1}:{nonce}:{nc}:{cnonce}:auth:{ha2}"))
        }
        _ => md5_hex(&format!("{ha1}:{nonce}:{ha2}")),
    };
    expected == response
}

async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    reason: &str,
    headers: &[(&str, &str)],
    body: &[u8],
) -> std::io::Result<()> {
    let mut out = format!("HTTP/1.1 {status} {reason}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    stream.write_all(out.as_bytes()).await?;
    stream.write_all(body).await?;
    stream.flush().await
}
