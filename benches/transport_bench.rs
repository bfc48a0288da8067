//! Benchmarks for UDP and TCP request handling.
//!
//! Measures proxy overhead with a mock DoH exchange that simulates upstream
//! latency based on public DoH benchmarks (~15ms average, ±5ms jitter).
//! Each query races a batch of three mock upstreams.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Runtime;

use bytes::Bytes;
use dohfwd::config::Config;
use dohfwd::error::UpstreamError;
use dohfwd::proxy::{ListenAddrs, Proxy};
use dohfwd::resolver::Resolver;
use dohfwd::upstream::Exchange;
use reqwest::Url;

const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Simulated upstream latency (based on real-world DoH benchmarks)
const BASE_LATENCY_MS: u64 = 15;
const JITTER_MS: u64 = 5;

fn build_dns_query() -> Vec<u8> {
    let mut query = Vec::new();
    query.extend_from_slice(&[0x12, 0x34]); // Query ID
    query.extend_from_slice(&[0x01, 0x00]); // Flags: standard query
    query.extend_from_slice(&[0x00, 0x01]); // Questions: 1
    query.extend_from_slice(&[0x00, 0x00]); // Answer RRs: 0
    query.extend_from_slice(&[0x00, 0x00]); // Authority RRs: 0
    query.extend_from_slice(&[0x00, 0x00]); // Additional RRs: 0
    // Query for "example.com"
    query.extend_from_slice(&[0x07]); // length of "example"
    query.extend_from_slice(b"example");
    query.extend_from_slice(&[0x03]); // length of "com"
    query.extend_from_slice(b"com");
    query.extend_from_slice(&[0x00]); // null terminator
    query.extend_from_slice(&[0x00, 0x01]); // Type: A
    query.extend_from_slice(&[0x00, 0x01]); // Class: IN
    query
}

fn build_tcp_dns_query() -> Vec<u8> {
    let query = build_dns_query();
    let len = query.len() as u16;
    let mut tcp_query = Vec::new();
    tcp_query.extend_from_slice(&len.to_be_bytes());
    tcp_query.extend_from_slice(&query);
    tcp_query
}

fn build_dns_response(query: &[u8]) -> Vec<u8> {
    let mut response = query.to_vec();
    response[2] = 0x81; // Response flag
    response[3] = 0x80; // Recursion available
    response[6] = 0x00; // Answer count
    response[7] = 0x01;
    // Answer: example.com A 93.184.216.34
    response.extend_from_slice(&[0xc0, 0x0c]); // Name pointer
    response.extend_from_slice(&[0x00, 0x01]); // Type: A
    response.extend_from_slice(&[0x00, 0x01]); // Class: IN
    response.extend_from_slice(&[0x00, 0x00, 0x01, 0x2c]); // TTL: 300
    response.extend_from_slice(&[0x00, 0x04]); // Data length: 4
    response.extend_from_slice(&[93, 184, 216, 34]); // IP address
    response
}

/// Mock DoH upstream with simulated latency
struct LatencyExchange;

impl Exchange for LatencyExchange {
    async fn exchange(&self, _upstream: &Url, query: Bytes) -> Result<Bytes, UpstreamError> {
        let jitter = rand::rng().random_range(0..=JITTER_MS * 2);
        let latency = BASE_LATENCY_MS - JITTER_MS + jitter;
        tokio::time::sleep(Duration::from_millis(latency)).await;
        Ok(Bytes::from(build_dns_response(&query)))
    }
}

fn start_proxy() -> ListenAddrs {
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let config = Config {
                listen_ip: "127.0.0.1".parse().unwrap(),
                udp_port: 0,
                tcp_port: 0,
                stats_interval_secs: 0,
                upstreams: (1..=5)
                    .map(|i| format!("https://doh{i}.example/dns-query"))
                    .collect(),
                ..Config::default()
            };
            let resolver = Resolver::new(
                LatencyExchange,
                config.upstream_urls().unwrap(),
                config.batch_size,
                config.timeout(),
            );
            let proxy = Proxy::bind_with(&config, Arc::new(resolver)).await.unwrap();
            tx.send(proxy.local_addrs().unwrap()).unwrap();
            proxy.run().await.unwrap();
        });
    });

    rx.recv().unwrap()
}

async fn tcp_round_trip(proxy_addr: SocketAddr) -> usize {
    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(&build_tcp_dns_query()).await.unwrap();

    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
    let mut total = 0;
    loop {
        let n = client.read(&mut buf[total..]).await.unwrap();
        if n == 0 {
            break;
        }
        total += n;
        if total >= 2 {
            let msg_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
            if total >= 2 + msg_len {
                break;
            }
        }
    }
    total
}

async fn udp_round_trip(proxy_addr: SocketAddr) -> usize {
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&build_dns_query(), proxy_addr).await.unwrap();

    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];
    tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap()
        .0
}

fn bench_requests(c: &mut Criterion) {
    let addrs = start_proxy();
    let rt = Runtime::new().unwrap();
    let query_size = build_dns_query().len() as u64;

    let mut group = c.benchmark_group("tcp");
    group.throughput(Throughput::Elements(1));
    group.bench_function(BenchmarkId::new("request_handling", "latency"), |b| {
        b.to_async(&rt).iter(|| tcp_round_trip(addrs.tcp));
    });
    group.throughput(Throughput::Bytes(query_size));
    group.bench_function(BenchmarkId::new("request_handling", "bytes"), |b| {
        b.to_async(&rt).iter(|| tcp_round_trip(addrs.tcp));
    });
    group.finish();

    let mut group = c.benchmark_group("udp");
    group.throughput(Throughput::Elements(1));
    group.bench_function(BenchmarkId::new("request_handling", "latency"), |b| {
        b.to_async(&rt).iter(|| udp_round_trip(addrs.udp));
    });
    group.throughput(Throughput::Bytes(query_size));
    group.bench_function(BenchmarkId::new("request_handling", "bytes"), |b| {
        b.to_async(&rt).iter(|| udp_round_trip(addrs.udp));
    });
    group.finish();
}

criterion_group!(benches, bench_requests);
criterion_main!(benches);
