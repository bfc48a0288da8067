//! dohfwd - A DNS proxy answering UDP, TCP and DoT clients from DNS-over-HTTPS
//! upstreams.
//!
//! This library exposes the resolver and transport implementations for
//! benchmarking and testing.

pub mod config;
pub mod error;
pub mod proxy;
pub mod resolver;
pub mod stats;
pub mod transport;
pub mod upstream;
