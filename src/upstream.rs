//! DNS-over-HTTPS upstream exchange.
//!
//! [`Exchange`] is the seam between the resolver's race policy and HTTP.
//! [`DohClient`] is the real implementation; tests substitute their own.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};

use crate::error::{ProxyError, UpstreamError};

/// Media type of wire-format DNS messages carried over HTTPS.
pub const DNS_MESSAGE: &str = "application/dns-message";

/// One query/response round trip with a single upstream endpoint.
pub trait Exchange: Send + Sync {
    /// Send `query` to `upstream` and return the response body.
    ///
    /// Only an HTTP 200 answer yields `Ok`; body length is judged by the
    /// caller.
    fn exchange(
        &self,
        upstream: &Url,
        query: Bytes,
    ) -> impl Future<Output = Result<Bytes, UpstreamError>> + Send;
}

/// DoH client backed by a shared, connection-pooling `reqwest::Client`.
#[derive(Clone)]
pub struct DohClient {
    client: Client,
}

impl DohClient {
    /// Build a client with certificate verification on and `timeout`
    /// applied to every request.
    pub fn new(timeout: Duration) -> Result<Self, ProxyError> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(ProxyError::Client)?;

        Ok(Self { client })
    }
}

impl Exchange for DohClient {
    async fn exchange(&self, upstream: &Url, query: Bytes) -> Result<Bytes, UpstreamError> {
        let response = self
            .client
            .post(upstream.clone())
            .header(CONTENT_TYPE, DNS_MESSAGE)
            .header(ACCEPT, DNS_MESSAGE)
            .body(query)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?)
    }
}
