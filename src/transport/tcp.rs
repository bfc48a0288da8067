//! TCP transport for DNS queries.
//!
//! Each client connection carries exactly one exchange: read a
//! length-prefixed query, resolve it, write the length-prefixed response,
//! close. Connections are handled in their own tasks so a slow client never
//! holds up the accept loop.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use super::{Protocol, QueryLogger, read_frame, with_client_timeout, write_frame};
use crate::error::{FrameError, ProxyError};
use crate::resolver::Resolver;
use crate::upstream::Exchange;

/// TCP transport for DNS proxy.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind a TCP listener for the transport.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProxyError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind {
                protocol: Protocol::Tcp,
                addr,
                source,
            })?;

        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }
}

/// What became of one stream exchange.
#[derive(Debug, PartialEq, Eq)]
pub enum Exchanged {
    /// A response of this many bytes was written back.
    Answered(usize),
    /// No upstream answered, nothing was written.
    Unanswered,
}

/// Handle a single stream exchange: read query, resolve, return response.
///
/// Used for both plain TCP and decrypted DoT streams. The stream is shut
/// down on every exit path; its reads and writes are each bounded by
/// `client_timeout`.
pub async fn handle_stream<S, E>(
    mut stream: S,
    client: SocketAddr,
    resolver: &Resolver<E>,
    client_timeout: Duration,
    logger: QueryLogger,
) -> Option<Exchanged>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Exchange,
{
    let outcome = exchange(&mut stream, client, resolver, client_timeout, logger).await;
    let _ = stream.shutdown().await;

    match outcome {
        Ok(exchanged) => Some(exchanged),
        Err(e) => {
            logger.dropped(client, &e);
            None
        }
    }
}

async fn exchange<S, E>(
    stream: &mut S,
    client: SocketAddr,
    resolver: &Resolver<E>,
    client_timeout: Duration,
    logger: QueryLogger,
) -> Result<Exchanged, FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    E: Exchange,
{
    let query = with_client_timeout(client_timeout, read_frame(stream)).await?;

    let started = Instant::now();
    let response = match resolver.resolve(&query).await {
        Ok(response) => response,
        Err(e) => {
            logger.failed(client, &e, started);
            return Ok(Exchanged::Unanswered);
        }
    };

    with_client_timeout(client_timeout, write_frame(stream, &response)).await?;
    logger.resolved(client, response.len(), started);

    Ok(Exchanged::Answered(response.len()))
}
