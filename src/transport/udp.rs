//! UDP transport for DNS queries.
//!
//! Handles connectionless DNS queries over UDP. Each datagram is resolved
//! in its own task and the answer goes back as a single datagram to the
//! sender. Unanswered queries get no reply at all; the client's own
//! timeout and retry take over.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;

use super::{MAX_UDP_QUERY_SIZE, Protocol, QueryLogger};
use crate::error::ProxyError;
use crate::resolver::Resolver;
use crate::upstream::Exchange;

/// UDP transport for DNS proxy.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the UDP socket for the transport.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ProxyError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind {
                protocol: Protocol::Udp,
                addr,
                source,
            })?;

        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Wait for the next datagram.
    ///
    /// At most [`MAX_UDP_QUERY_SIZE`] bytes are kept; anything beyond that
    /// is truncated by the read itself.
    pub async fn recv(&self) -> std::io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = [0u8; MAX_UDP_QUERY_SIZE];
        let (len, src) = self.socket.recv_from(&mut buf).await?;
        Ok((buf[..len].to_vec(), src))
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}

/// Resolve one datagram and send the answer back to `client`.
///
/// Returns whether a reply datagram was sent.
pub async fn handle_datagram<E: Exchange>(
    socket: &UdpSocket,
    query: &[u8],
    client: SocketAddr,
    resolver: &Resolver<E>,
    logger: QueryLogger,
) -> bool {
    let started = Instant::now();
    let response = match resolver.resolve(query).await {
        Ok(response) => response,
        Err(e) => {
            logger.failed(client, &e, started);
            return false;
        }
    };

    match socket.send_to(&response, client).await {
        Ok(_) => {
            logger.resolved(client, response.len(), started);
            true
        }
        Err(e) => {
            logger.dropped(client, &e);
            false
        }
    }
}
