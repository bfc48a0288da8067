//! Transport layer implementations for DNS proxy.
//!
//! Provides UDP, TCP and DNS-over-TLS front-ends. Each one strips its own
//! framing, hands the raw query to the [`Resolver`](crate::resolver::Resolver)
//! and writes the answer back in the same framing.

pub mod tcp;
pub mod tls;
pub mod udp;

use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{FrameError, ResolveError};

/// Largest query read from a UDP datagram (classic, non-EDNS0 limit).
pub const MAX_UDP_QUERY_SIZE: usize = 512;

/// Transport protocol identifier for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
            Protocol::Tls => "DoT",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logger for DNS query events.
#[derive(Clone, Copy)]
pub struct QueryLogger {
    protocol: Protocol,
}

impl QueryLogger {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    pub fn resolved(&self, client: SocketAddr, bytes: usize, started: Instant) {
        debug!(
            protocol = %self.protocol,
            client = %client,
            bytes,
            elapsed_ms = elapsed_ms(started),
            "query resolved"
        );
    }

    pub fn failed(&self, client: SocketAddr, error: &ResolveError, started: Instant) {
        debug!(
            protocol = %self.protocol,
            client = %client,
            error = %error,
            elapsed_ms = elapsed_ms(started),
            "query unanswered"
        );
    }

    pub fn dropped(&self, client: SocketAddr, error: &dyn fmt::Display) {
        debug!(
            protocol = %self.protocol,
            client = %client,
            error = %error,
            "exchange dropped"
        );
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// Read one length-prefixed DNS message.
///
/// The 2-byte big-endian prefix is followed by exactly that many bytes. A
/// message is only returned once it has arrived in full.
pub async fn read_frame<R>(stream: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
        _ => FrameError::Io(e),
    })?;

    let len = u16::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(FrameError::Empty);
    }

    let mut message = vec![0u8; len];
    stream
        .read_exact(&mut message)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::Truncated { expected: len },
            _ => FrameError::Io(e),
        })?;

    Ok(message)
}

/// Write one DNS message with its 2-byte big-endian length prefix.
pub async fn write_frame<W>(stream: &mut W, message: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(message.len())
        .map_err(|_| FrameError::TooLarge { len: message.len() })?;

    let mut framed = Vec::with_capacity(2 + message.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(message);

    stream.write_all(&framed).await?;
    stream.flush().await?;

    Ok(())
}

/// Run a client-side I/O step under the per-connection time limit.
pub(crate) async fn with_client_timeout<T, F>(limit: Duration, io: F) -> Result<T, FrameError>
where
    F: Future<Output = Result<T, FrameError>>,
{
    tokio::time::timeout(limit, io)
        .await
        .unwrap_or(Err(FrameError::TimedOut))
}
