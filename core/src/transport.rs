//! Buffered connection over the transport collaborator.
//!
//! # Design
//! `Connection` is generic over any `AsyncRead + AsyncWrite` stream —
//! `TcpStream` in production, `tokio::io::duplex` in unit tests — and owns
//! a small read buffer so body bytes that arrive together with the response
//! head are not lost. Every suspension point here is cancellable: the
//! dispatcher drops the connection the instant a timer resolves the
//! outcome, which closes the socket and unblocks the peer.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{ClientError, ConnectionError};
use crate::http::ResponseHead;

/// Upper bound on a response head; anything larger is treated as malformed.
const MAX_HEAD_BYTES: usize = 16 * 1024;

const READ_CHUNK: usize = 8 * 1024;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One transport connection with read buffering.
pub(crate) struct Connection<S = TcpStream> {
    stream: S,
    buf: Vec<u8>,
    id: u64,
}

impl Connection<TcpStream> {
    /// Establish a TCP connection. The caller arms the connect timer around
    /// this call; refusal and reset are classified for the error taxonomy.
    pub(crate) async fn connect(host: &str, port: u16) -> Result<Self, ClientError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(ConnectionError::from_io)?;
        let conn = Self::from_stream(stream);
        tracing::debug!(conn = conn.id, %host, port, "connected");
        Ok(conn)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> Connection<S> {
    pub(crate) fn from_stream(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) async fn write_all(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(ConnectionError::from_io)?;
        self.stream
            .flush()
            .await
            .map_err(ConnectionError::from_io)?;
        Ok(())
    }

    /// Read until the blank line and parse the head. Bytes past the blank
    /// line stay buffered for subsequent body reads.
    pub(crate) async fn read_head(&mut self) -> Result<ResponseHead, ClientError> {
        loop {
            if let Some(end) = find_head_end(&self.buf) {
                let head = ResponseHead::parse(&self.buf[..end])?;
                self.buf.drain(..end + 4);
                return Ok(head);
            }
            if self.buf.len() > MAX_HEAD_BYTES {
                return Err(ConnectionError::Io("response head too large".into()).into());
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self
                .stream
                .read(&mut chunk)
                .await
                .map_err(ConnectionError::from_io)?;
            if n == 0 {
                return Err(ConnectionError::Io(
                    "connection closed before response head".into(),
                )
                .into());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Next slice of body bytes, draining the internal buffer first.
    /// `Ok(None)` signals end-of-stream.
    pub(crate) async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        if !self.buf.is_empty() {
            return Ok(Some(std::mem::take(&mut self.buf)));
        }
        let mut chunk = [0u8; READ_CHUNK];
        let n = self
            .stream
            .read(&mut chunk)
            .await
            .map_err(ConnectionError::from_io)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(chunk[..n].to_vec()))
    }

    /// Leftover buffered bytes invalidate reuse: the next request on this
    /// connection would read a stale body.
    pub(crate) fn is_clean(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) async fn close(mut self) {
        let _ = self.stream.shutdown().await;
        tracing::debug!(conn = self.id, "closed");
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_head_leaves_body_bytes_buffered() {
        let (mut server, client) = tokio::io::duplex(1024);
        let mut conn = Connection::from_stream(client);

        server
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nTest")
            .await
            .unwrap();

        let head = conn.read_head().await.unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.content_length(), Some(4));

        let chunk = conn.read_chunk().await.unwrap().unwrap();
        assert_eq!(chunk, b"Test");
        assert!(conn.is_clean());
    }

    #[tokio::test]
    async fn read_head_across_split_writes() {
        let (mut server, client) = tokio::io::duplex(1024);
        let mut conn = Connection::from_stream(client);

        let writer = tokio::spawn(async move {
            server.write_all(b"HTTP/1.1 401 Unauth").await.unwrap();
            tokio::task::yield_now().await;
            server
                .write_all(b"orized\r\nWWW-Authenticate: Basic realm=\"r\"\r\n\r\n")
                .await
                .unwrap();
            server
        });

        let head = conn.read_head().await.unwrap();
        assert_eq!(head.status, 401);
        assert_eq!(head.challenge(), Some(r#"Basic realm="r""#));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn eof_before_head_is_a_connection_error() {
        let (server, client) = tokio::io::duplex(1024);
        let mut conn = Connection::from_stream(client);
        drop(server);

        let err = conn.read_head().await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }

    #[tokio::test]
    async fn read_chunk_reports_eof_as_none() {
        let (mut server, client) = tokio::io::duplex(1024);
        let mut conn = Connection::from_stream(client);

        server.write_all(b"abc").await.unwrap();
        drop(server);

        assert_eq!(conn.read_chunk().await.unwrap().unwrap(), b"abc");
        assert!(conn.read_chunk().await.unwrap().is_none());
    }
}
