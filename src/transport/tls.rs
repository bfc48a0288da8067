//! DNS-over-TLS transport.
//!
//! Same one-shot, length-prefixed exchange as plain TCP, carried inside a
//! TLS session terminated with the configured certificate and key.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

use super::Protocol;
use crate::error::ProxyError;

/// Read the certificate chain from a PEM file.
pub fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ProxyError> {
    let certs = CertificateDer::pem_file_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| {
            ProxyError::Tls(format!(
                "failed to read certificates from {}: {e:?}",
                path.display()
            ))
        })?;

    if certs.is_empty() {
        return Err(ProxyError::Tls(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Read a PKCS#8, PKCS#1 or SEC1 private key from a PEM file.
pub fn read_key(path: &Path) -> Result<PrivateKeyDer<'static>, ProxyError> {
    PrivateKeyDer::from_pem_file(path).map_err(|e| {
        ProxyError::Tls(format!(
            "failed to read private key from {}: {e:?}",
            path.display()
        ))
    })
}

/// Build the server-side TLS configuration for DoT.
pub fn server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, ProxyError> {
    let certs = read_certs(cert_path)?;
    let key = read_key(key_path)?;

    let config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .and_then(|builder| builder.with_no_client_auth().with_single_cert(certs, key))
            .map_err(|e| ProxyError::Tls(e.to_string()))?;

    Ok(Arc::new(config))
}

/// DoT transport for DNS proxy.
pub struct TlsTransport {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsTransport {
    /// Load the certificate and key, then bind the DoT listener.
    pub async fn bind(addr: SocketAddr, cert: &Path, key: &Path) -> Result<Self, ProxyError> {
        let config = server_config(cert, key)?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::Bind {
                protocol: Protocol::Tls,
                addr,
                source,
            })?;

        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept the next TCP connection. The TLS handshake is left to the
    /// connection's own task.
    pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    pub fn acceptor(&self) -> TlsAcceptor {
        self.acceptor.clone()
    }
}
