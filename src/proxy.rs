//! DNS proxy orchestration.
//!
//! Binds transports and runs the server loop: a single multiplexed wait over
//! every active listener, with each ready datagram or connection handed to
//! its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::ProxyError;
use crate::resolver::Resolver;
use crate::transport::tcp::{TcpTransport, handle_stream};
use crate::transport::tls::TlsTransport;
use crate::transport::udp::{UdpTransport, handle_datagram};
use crate::transport::{Protocol, QueryLogger};
use crate::upstream::{DohClient, Exchange};

/// Addresses the proxy ended up listening on.
#[derive(Debug, Clone, Copy)]
pub struct ListenAddrs {
    pub udp: SocketAddr,
    pub tcp: SocketAddr,
    /// `None` when DoT is not configured or failed to start.
    pub tls: Option<SocketAddr>,
}

/// A bound DNS proxy, ready to [`run`](Proxy::run).
pub struct Proxy<E = DohClient> {
    udp: UdpTransport,
    tcp: TcpTransport,
    tls: Option<TlsTransport>,
    resolver: Arc<Resolver<E>>,
    client_timeout: Duration,
    stats_interval: Duration,
}

impl Proxy<DohClient> {
    /// Bind every configured transport, resolving through DoH.
    pub async fn bind(config: &Config) -> Result<Self, ProxyError> {
        let resolver = Resolver::from_config(config)?;
        Self::bind_with(config, Arc::new(resolver)).await
    }
}

impl<E: Exchange + 'static> Proxy<E> {
    /// Bind every configured transport around an existing resolver.
    ///
    /// UDP and TCP are mandatory and their bind errors are returned. A DoT
    /// listener that cannot start is logged and left out.
    pub async fn bind_with(config: &Config, resolver: Arc<Resolver<E>>) -> Result<Self, ProxyError> {
        let udp = UdpTransport::bind(config.udp_addr()).await?;
        let tcp = TcpTransport::bind(config.tcp_addr()).await?;

        let tls = match config.tls_paths() {
            Some((cert, key)) => match TlsTransport::bind(config.dot_addr(), cert, key).await {
                Ok(tls) => Some(tls),
                Err(e) => {
                    error!(addr = %config.dot_addr(), error = %e, "DoT disabled");
                    None
                }
            },
            None => {
                warn!("no TLS certificate configured, DoT disabled");
                None
            }
        };

        Ok(Self {
            udp,
            tcp,
            tls,
            resolver,
            client_timeout: config.client_timeout(),
            stats_interval: Duration::from_secs(config.stats_interval_secs),
        })
    }

    pub fn local_addrs(&self) -> Result<ListenAddrs, ProxyError> {
        Ok(ListenAddrs {
            udp: self.udp.local_addr()?,
            tcp: self.tcp.local_addr()?,
            tls: self.tls.as_ref().map(|t| t.local_addr()).transpose()?,
        })
    }

    /// Run the server loop. Never returns under normal operation.
    pub async fn run(self) -> Result<(), ProxyError> {
        let addrs = self.local_addrs()?;
        info!(
            udp = %addrs.udp,
            tcp = %addrs.tcp,
            dot = ?addrs.tls,
            upstreams = self.resolver.upstreams().len(),
            "DNS proxy started"
        );

        if !self.stats_interval.is_zero() {
            spawn_stats_reporter(self.resolver.clone(), self.stats_interval);
        }

        let udp_socket = self.udp.socket();

        loop {
            tokio::select! {
                result = self.udp.recv() => match result {
                    Ok((query, client)) => {
                        let socket = udp_socket.clone();
                        let resolver = self.resolver.clone();
                        tokio::spawn(async move {
                            handle_datagram(
                                &socket,
                                &query,
                                client,
                                &resolver,
                                QueryLogger::new(Protocol::Udp),
                            )
                            .await;
                        });
                    }
                    // e.g. ICMP port unreachable surfacing on some platforms
                    Err(e) => warn!(error = %e, "UDP recv error"),
                },
                result = self.tcp.accept() => match result {
                    Ok((stream, client)) => self.spawn_tcp(stream, client),
                    Err(e) => warn!(error = %e, "TCP accept error"),
                },
                result = accept_tls(self.tls.as_ref()) => match result {
                    Ok((stream, client)) => self.spawn_tls(stream, client),
                    Err(e) => warn!(error = %e, "DoT accept error"),
                },
            }
        }
    }

    fn spawn_tcp(&self, stream: TcpStream, client: SocketAddr) {
        let resolver = self.resolver.clone();
        let client_timeout = self.client_timeout;
        tokio::spawn(async move {
            handle_stream(
                stream,
                client,
                &resolver,
                client_timeout,
                QueryLogger::new(Protocol::Tcp),
            )
            .await;
        });
    }

    fn spawn_tls(&self, stream: TcpStream, client: SocketAddr) {
        let Some(tls) = self.tls.as_ref() else {
            return;
        };
        let acceptor = tls.acceptor();
        let resolver = self.resolver.clone();
        let client_timeout = self.client_timeout;
        let logger = QueryLogger::new(Protocol::Tls);

        tokio::spawn(async move {
            let stream = match tokio::time::timeout(client_timeout, acceptor.accept(stream)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return logger.dropped(client, &e),
                Err(_) => return logger.dropped(client, &"TLS handshake timed out"),
            };
            handle_stream(stream, client, &resolver, client_timeout, logger).await;
        });
    }
}

/// Accept on the DoT listener, or wait forever when there is none.
async fn accept_tls(tls: Option<&TlsTransport>) -> std::io::Result<(TcpStream, SocketAddr)> {
    match tls {
        Some(tls) => tls.accept().await,
        None => std::future::pending().await,
    }
}

fn spawn_stats_reporter<E: Exchange + 'static>(resolver: Arc<Resolver<E>>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            let stats = resolver.stats_snapshot_and_reset();
            let top = stats.wins.first().map(|(url, n)| format!("{url} ({n})"));
            info!(
                requests = stats.requests,
                resolved = stats.resolved,
                failed = stats.failed,
                avg_response_ms = stats.avg_response_ms,
                top_upstream = top.as_deref().unwrap_or("-"),
                "stats"
            );
        }
    });
}
