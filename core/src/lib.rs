//! Asynchronous HTTP client core: authentication negotiation and
//! multi-layer timeout/cancellation.
//!
//! # Overview
//! The engine coordinates a credential negotiation protocol (Basic and
//! Digest, preemptive and challenge-response) with three independent timers
//! per logical request — connect, total-request, and pooled-idle — any of
//! which can abort the request at any stage. It also distinguishes "the
//! server ran out of time" from "the server closed the connection early":
//! a connection closed before its declared content length is satisfied is
//! reported as a connection error whose message starts with the literal
//! prefix `"Remotely Closed"`, never reinterpreted as a timeout.
//!
//! # Design
//! - Each request runs as one tokio task; requests share only the
//!   connection pool. No ambient/global state: timers and credentials are
//!   explicit constructor parameters.
//! - Completion is a write-once cell raced by the I/O path, the timers, and
//!   the pool reaper; first writer wins, later writers are no-ops.
//! - Cancellation is by drop: the dispatcher races the exchange against the
//!   cell, so a fired timer closes the transport immediately.
//! - Auth retries are internal and invisible to the caller except through
//!   elapsed latency; at most one credentialed retry happens per request.

mod auth;
pub mod challenge;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
mod outcome;
mod pool;
pub mod realm;
pub mod timeout;
mod transport;

pub mod client;

pub use client::{Client, RequestBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, ConnectionError};
pub use http::{Method, Request, Response};
pub use outcome::{Outcome, ResponseHandle};
pub use realm::{AuthScheme, Realm, RealmBuilder};
pub use timeout::TimerKind;
