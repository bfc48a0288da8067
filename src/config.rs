//! Proxy configuration.
//!
//! A [`Config`] is built once at startup from defaults, an optional TOML file
//! and command line overrides, validated, and then shared read-only.

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::ProxyError;

/// Public DoH resolvers used when no upstream list is configured.
pub const DEFAULT_UPSTREAMS: &[&str] = &[
    "https://1.0.0.1/dns-query",
    "https://8.8.4.4/dns-query",
    "https://208.67.220.220/dns-query",
    "https://dns.nextdns.io/dns-query",
    "https://doh.opendns.com/dns-query",
    "https://unfiltered.adguard-dns.com/dns-query",
    "https://freedns.controld.com/p0",
    "https://public.dns.iij.jp/dns-query",
    "https://doh.dns.sb/dns-query",
    "https://jp.tiar.app/dns-query",
    "https://dns.dnsguard.pub/dns-query",
    "https://doh.cleanbrowsing.org/doh/security-filter/",
    "https://wikimedia-dns.org/dns-query",
    "https://doh.ffmuc.net/dns-query",
    "https://sky.rethinkdns.com/dns-query",
];

/// Configuration for the DNS proxy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address every listener binds to.
    pub listen_ip: IpAddr,
    pub udp_port: u16,
    pub tcp_port: u16,
    /// DNS-over-TLS port; only served when a certificate and key are set.
    pub dot_port: u16,
    /// Per-request upstream timeout, which also bounds a whole resolution.
    pub timeout_secs: u64,
    /// Number of upstreams raced per query.
    pub batch_size: usize,
    /// Accepted for compatibility with existing config files. Responses are
    /// never cached.
    pub cache_ttl_secs: u64,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    /// DoH endpoint URLs.
    pub upstreams: Vec<String>,
    /// Bound on client-side reads and writes of one TCP/DoT exchange.
    pub client_timeout_secs: u64,
    /// Seconds between stats log lines, 0 disables them.
    pub stats_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            udp_port: 53,
            tcp_port: 53,
            dot_port: 853,
            timeout_secs: 4,
            batch_size: 3,
            cache_ttl_secs: 600,
            tls_cert: None,
            tls_key: None,
            upstreams: DEFAULT_UPSTREAMS.iter().map(|s| s.to_string()).collect(),
            client_timeout_secs: 10,
            stats_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load a config file, filling anything it leaves out with defaults.
    pub fn from_file(path: &Path) -> Result<Self, ProxyError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ProxyError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
            .map_err(|e| ProxyError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Check the invariants the rest of the proxy relies on.
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.upstreams.is_empty() {
            return Err(ProxyError::Config("at least one upstream is required".into()));
        }
        self.upstream_urls()?;

        if self.batch_size == 0 {
            return Err(ProxyError::Config("batch_size must be at least 1".into()));
        }
        if self.timeout_secs == 0 {
            return Err(ProxyError::Config("timeout_secs must be at least 1".into()));
        }
        if self.tls_cert.is_some() != self.tls_key.is_some() {
            return Err(ProxyError::Config(
                "tls_cert and tls_key must be set together".into(),
            ));
        }

        Ok(())
    }

    /// Parse the upstream list into URLs.
    pub fn upstream_urls(&self) -> Result<Vec<Url>, ProxyError> {
        self.upstreams
            .iter()
            .map(|raw| {
                let url = Url::parse(raw)
                    .map_err(|e| ProxyError::Config(format!("invalid upstream {raw:?}: {e}")))?;
                match url.scheme() {
                    "https" | "http" => Ok(url),
                    other => Err(ProxyError::Config(format!(
                        "upstream {raw:?} uses unsupported scheme {other:?}"
                    ))),
                }
            })
            .collect()
    }

    pub fn udp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.udp_port)
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.tcp_port)
    }

    pub fn dot_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_ip, self.dot_port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }

    /// Certificate and key paths, if DoT is configured.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Some((cert.as_path(), key.as_path())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_classic_deployment() {
        let config = Config::default();
        assert_eq!(config.udp_port, 53);
        assert_eq!(config.tcp_port, 53);
        assert_eq!(config.dot_port, 853);
        assert_eq!(config.timeout(), Duration::from_secs(4));
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.upstreams.len(), DEFAULT_UPSTREAMS.len());
        assert!(config.tls_paths().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            udp_port = 5353
            batch_size = 2
            upstreams = ["https://doh.example/dns-query"]
            "#,
        )
        .unwrap();

        assert_eq!(config.udp_port, 5353);
        assert_eq!(config.tcp_port, 53);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.upstreams, vec!["https://doh.example/dns-query"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_toml("cache_size = 10").is_err());
    }

    #[test]
    fn validate_rejects_empty_upstreams() {
        let config = Config {
            upstreams: Vec::new(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ProxyError::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_scheme() {
        let config = Config {
            upstreams: vec!["ftp://doh.example/dns-query".into()],
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            upstreams: vec!["not a url".into()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_batch() {
        let config = Config {
            batch_size: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_cert_and_key_together() {
        let config = Config {
            tls_cert: Some("cert.pem".into()),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            tls_cert: Some("cert.pem".into()),
            tls_key: Some("key.pem".into()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.tls_paths().is_some());
    }
}
