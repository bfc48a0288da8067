//! Error types for every failure path in the proxy.
//!
//! Startup failures surface as [`ProxyError`]. Everything that can go wrong
//! while serving a single query stays inside that query's handler as one of
//! the other enums and is logged, never propagated.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::transport::Protocol;

/// Errors that prevent the proxy (or one of its transports) from starting.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind {protocol} listener on {addr}: {source}")]
    Bind {
        protocol: Protocol,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("failed to build upstream HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A single upstream's failed vote in a resolution race.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}")]
    Status { status: u16 },

    #[error("response body too short ({len} bytes)")]
    ShortBody { len: usize },
}

/// Total failure of a resolution attempt.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no upstreams configured")]
    NoUpstreams,

    #[error("all {attempted} sampled upstreams failed")]
    AllFailed { attempted: usize },

    #[error("no upstream answered within {0:?}")]
    Timeout(Duration),
}

/// Failures reading or writing a length-prefixed DNS frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed before a length prefix was read")]
    Closed,

    #[error("connection closed before {expected} message bytes were read")]
    Truncated { expected: usize },

    #[error("zero-length frame")]
    Empty,

    #[error("message of {len} bytes does not fit a 2-byte length prefix")]
    TooLarge { len: usize },

    #[error("client I/O timed out")]
    TimedOut,

    #[error(transparent)]
    Io(#[from] io::Error),
}
