//! Request dispatcher: ties auth, timers, pooling, and health together.
//!
//! # Design
//! `Client::execute` spawns one tokio task per logical request and hands
//! back a [`ResponseHandle`] over the shared outcome cell. Inside the task,
//! the whole exchange races against `OutcomeCell::resolved()`: the moment a
//! timer (or anything else) resolves the outcome, the exchange future is
//! dropped, which closes the transport — a fired timer never leaves the
//! operation running. The exchange itself is sequential: connect (under the
//! connect timer), optionally attach credentials preemptively, send, read
//! the head, retry once on a challenge, stream the body under the health
//! monitor, and resolve exactly once.

use std::sync::Arc;

use crate::auth::AuthNegotiator;
use crate::config::ClientConfig;
use crate::error::{ClientError, ConnectionError};
use crate::health::TransferState;
use crate::http::{encode_request, split_url, Method, Request, Response, ResponseHead};
use crate::outcome::{Outcome, OutcomeCell, ResponseHandle};
use crate::pool::Pool;
use crate::realm::Realm;
use crate::timeout::{TimeoutSupervisor, TimerKind};
use crate::transport::Connection;

/// Asynchronous HTTP client for the auth/timeout slice.
///
/// Cheap to clone-by-reference; requests share only the connection pool.
/// Must be used from within a tokio runtime.
pub struct Client {
    config: ClientConfig,
    pool: Arc<Pool>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let pool = Arc::new(Pool::new(config.pooled_connection_idle_timeout));
        Self { config, pool }
    }

    pub fn prepare_get(&self, url: &str) -> RequestBuilder<'_> {
        self.prepare(Method::Get, url)
    }

    pub fn prepare_post(&self, url: &str) -> RequestBuilder<'_> {
        self.prepare(Method::Post, url)
    }

    fn prepare(&self, method: Method, url: &str) -> RequestBuilder<'_> {
        RequestBuilder {
            client: self,
            request: Request {
                method,
                url: url.to_string(),
                headers: Vec::new(),
                body: None,
            },
            realm: None,
        }
    }

    fn execute(&self, request: Request, realm: Option<Realm>) -> ResponseHandle {
        let cell = OutcomeCell::new();
        let handle = ResponseHandle::new(cell.clone());
        let config = self.config.clone();
        let pool = Arc::clone(&self.pool);
        let realm = realm.or_else(|| config.realm.clone());
        tokio::spawn(run_request(config, pool, request, realm, cell));
        handle
    }
}

/// Per-request builder mirroring the prepare/realm/header/execute surface.
pub struct RequestBuilder<'a> {
    client: &'a Client,
    request: Request,
    realm: Option<Realm>,
}

impl RequestBuilder<'_> {
    /// Credential store for this request, overriding the client default.
    pub fn realm(mut self, realm: Realm) -> Self {
        self.realm = Some(realm);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.request.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, bytes: Vec<u8>) -> Self {
        self.request.body = Some(bytes);
        self
    }

    /// Dispatch the request. The total-request timer starts now.
    pub fn execute(self) -> ResponseHandle {
        self.client.execute(self.request, self.realm)
    }
}

async fn run_request(
    config: ClientConfig,
    pool: Arc<Pool>,
    request: Request,
    realm: Option<Realm>,
    cell: OutcomeCell,
) {
    let supervisor = TimeoutSupervisor::new(cell.clone());
    // The total budget covers the whole logical exchange, retries included.
    let _total = supervisor.arm(TimerKind::Request, config.request_timeout);

    tokio::select! {
        _ = cell.resolved() => {
            // A timer won the race; dropping the exchange future closes the
            // transport and unblocks any pending read.
            tracing::debug!("exchange aborted by earlier resolution");
        }
        _ = exchange(&config, &pool, &request, realm, &cell, &supervisor) => {}
    }
}

async fn exchange(
    config: &ClientConfig,
    pool: &Pool,
    request: &Request,
    realm: Option<Realm>,
    cell: &OutcomeCell,
    supervisor: &TimeoutSupervisor,
) {
    let (host, port, path) = match split_url(&request.url) {
        Ok(parts) => parts,
        Err(err) => {
            cell.resolve(Outcome::from_result(Err(err)));
            return;
        }
    };
    let key = format!("{host}:{port}");
    let host_header = if port == 80 { host.clone() } else { key.clone() };

    let mut conn = match pool.checkout(&key) {
        Some(conn) => conn,
        None => {
            let _connect = supervisor.arm(TimerKind::Connect, config.connect_timeout);
            match Connection::connect(&host, port).await {
                Ok(conn) => conn,
                Err(err) => {
                    cell.resolve(Outcome::from_result(Err(err)));
                    return;
                }
            }
        }
    };

    let mut negotiator = AuthNegotiator::new(realm);
    match drive(
        &mut conn,
        &mut negotiator,
        request,
        &host,
        port,
        &host_header,
        &path,
        config,
        supervisor,
    )
    .await
    {
        Ok((response, reusable)) => {
            tracing::debug!(status = response.status, "request complete");
            cell.resolve(Outcome::Success(response));
            if reusable {
                pool.checkin(&key, conn, cell.clone());
            } else {
                conn.close().await;
            }
        }
        Err(err) => {
            cell.resolve(Outcome::from_result(Err(err)));
            conn.close().await;
        }
    }
}

/// Send the request and negotiate at most one credentialed retry. Returns
/// the final response plus whether the connection may be pooled.
#[allow(clippy::too_many_arguments)]
async fn drive(
    conn: &mut Connection,
    negotiator: &mut AuthNegotiator,
    request: &Request,
    host: &str,
    port: u16,
    host_header: &str,
    path: &str,
    config: &ClientConfig,
    supervisor: &TimeoutSupervisor,
) -> Result<(Response, bool), ClientError> {
    let mut auth: Option<(&'static str, String)> = negotiator
        .preemptive_header()
        .map(|value| ("Authorization", value));

    loop {
        let wire = encode_request(
            request,
            host_header,
            path,
            auth.as_ref().map(|(name, value)| (*name, value.as_str())),
        );
        conn.write_all(&wire).await?;
        let head = conn.read_head().await?;

        if head.is_unauthorized() {
            if let Some(value) =
                negotiator.on_unauthorized(head.challenge(), request.method.as_str(), path)?
            {
                let name = if head.status == 407 {
                    "Proxy-Authorization"
                } else {
                    "Authorization"
                };
                // Drain the challenge body so the retry reads a clean stream.
                let (_, reusable) = read_body(conn, &head).await?;
                if !reusable || !head.keep_alive() {
                    let _connect = supervisor.arm(TimerKind::Connect, config.connect_timeout);
                    *conn = Connection::connect(host, port).await?;
                }
                auth = Some((name, value));
                continue;
            }
            // No credentials configured: the unauthorized response itself is
            // the caller's answer.
        }

        let (body, reusable) = read_body(conn, &head).await?;
        let response = Response {
            status: head.status,
            headers: head.headers.clone(),
            body,
        };
        let reusable = reusable && head.keep_alive();
        return Ok((response, reusable));
    }
}

/// Stream the body under the health monitor. Returns the body plus whether
/// the connection stayed healthy enough to reuse.
async fn read_body(
    conn: &mut Connection,
    head: &ResponseHead,
) -> Result<(Vec<u8>, bool), ClientError> {
    let declared = head.content_length();
    let mut transfer = TransferState::new(declared);
    let mut body = Vec::new();

    while !transfer.is_complete() {
        match conn.read_chunk().await {
            Ok(Some(chunk)) => {
                // Never consume past the declared length; anything beyond it
                // is not ours and poisons reuse.
                let take = declared.map_or(chunk.len(), |d| {
                    chunk.len().min((d - transfer.received()) as usize)
                });
                transfer.record(take);
                body.extend_from_slice(&chunk[..take]);
                if take < chunk.len() {
                    return Ok((body, false));
                }
            }
            Ok(None) => {
                transfer.close()?;
                // Clean end-of-stream: either the length matched exactly or
                // none was declared. Closed connections are not reusable.
                return Ok((body, false));
            }
            Err(err) => {
                if err == ConnectionError::Reset {
                    // The remote actively terminated the stream; a shortfall
                    // is a premature closure, which outranks the reset.
                    transfer.close()?;
                }
                return Err(err.into());
            }
        }
    }
    Ok((body, true))
}
