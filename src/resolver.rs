//! DNS query resolution logic.
//!
//! Every query is raced across a random batch of DoH upstreams:
//! 1. Sample `batch_size` upstreams without replacement, in random order
//! 2. POST the query to all of them concurrently
//! 3. Return the first HTTP 200 body longer than a DNS header
//!
//! Transports handle the actual I/O, resolver handles the race.

use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Url;
use tracing::debug;

use crate::config::Config;
use crate::error::{ProxyError, ResolveError, UpstreamError};
use crate::stats::{Stats, StatsSnapshot};
use crate::upstream::{DohClient, Exchange};

/// Length of the fixed DNS message header.
pub const DNS_HEADER_LEN: usize = 12;

/// Resolver races DoH upstreams for each query.
///
/// Holds no per-query state, so one instance is shared by every transport
/// and may resolve any number of queries concurrently.
pub struct Resolver<E = DohClient> {
    exchange: E,
    upstreams: Vec<Url>,
    batch_size: usize,
    timeout: Duration,
    stats: Stats,
}

impl Resolver<DohClient> {
    /// Create a resolver talking HTTPS to the configured upstreams.
    pub fn from_config(config: &Config) -> Result<Self, ProxyError> {
        let client = DohClient::new(config.timeout())?;
        Ok(Self::new(
            client,
            config.upstream_urls()?,
            config.batch_size,
            config.timeout(),
        ))
    }
}

impl<E: Exchange> Resolver<E> {
    pub fn new(exchange: E, upstreams: Vec<Url>, batch_size: usize, timeout: Duration) -> Self {
        Self {
            exchange,
            upstreams,
            batch_size,
            timeout,
            stats: Stats::new(),
        }
    }

    /// Resolve a raw DNS query.
    ///
    /// The query is forwarded untouched, even if it is empty or malformed.
    /// Returns the winning upstream's response body, unmodified.
    pub async fn resolve(&self, query: &[u8]) -> Result<Bytes, ResolveError> {
        let start = Instant::now();
        let outcome = self.race(query).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok((upstream, response)) => {
                self.stats.record_resolved(upstream, elapsed_ms);
                debug!(
                    upstream = %upstream,
                    bytes = response.len(),
                    elapsed_ms,
                    "upstream won race"
                );
                Ok(response)
            }
            Err(e) => {
                self.stats.record_failed(elapsed_ms);
                Err(e)
            }
        }
    }

    /// Pick the upstreams for one resolution attempt.
    ///
    /// Returns `min(batch_size, upstreams)` distinct endpoints in random order.
    pub fn select_batch(&self) -> Vec<&Url> {
        let amount = self.batch_size.min(self.upstreams.len());
        rand::seq::index::sample(&mut rand::rng(), self.upstreams.len(), amount)
            .into_iter()
            .map(|i| &self.upstreams[i])
            .collect()
    }

    async fn race(&self, query: &[u8]) -> Result<(&Url, Bytes), ResolveError> {
        let batch = self.select_batch();
        if batch.is_empty() {
            return Err(ResolveError::NoUpstreams);
        }
        let attempted = batch.len();
        let query = Bytes::copy_from_slice(query);

        let mut in_flight: FuturesUnordered<_> = batch
            .into_iter()
            .map(|upstream| {
                let query = query.clone();
                async move {
                    let result = self.exchange.exchange(upstream, query).await;
                    (upstream, result.and_then(check_body))
                }
            })
            .collect();

        let first_valid = async {
            while let Some((upstream, result)) = in_flight.next().await {
                match result {
                    Ok(response) => return Ok((upstream, response)),
                    Err(e) => debug!(upstream = %upstream, error = %e, "upstream vote failed"),
                }
            }
            Err(ResolveError::AllFailed { attempted })
        };

        // Dropping the remaining futures abandons the losing requests.
        match tokio::time::timeout(self.timeout, first_valid).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ResolveError::Timeout(self.timeout)),
        }
    }

    pub fn upstreams(&self) -> &[Url] {
        &self.upstreams
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}

/// A body only counts as an answer if it is longer than a bare header.
fn check_body(body: Bytes) -> Result<Bytes, UpstreamError> {
    if body.len() > DNS_HEADER_LEN {
        Ok(body)
    } else {
        Err(UpstreamError::ShortBody { len: body.len() })
    }
}
