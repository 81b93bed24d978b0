//! Command-line / environment configuration: a `clap::Parser` struct
//! whose doc comments double as `--help` text, with the `env` feature
//! of `clap` v4 reading `UDP_BIND_ADDRESS`, `UDP_PORT`, `REDIS_URL`,
//! and `DOCKER_ENV` declaratively instead of via raw
//! `std::env::var` calls.

use clap::Parser;
use std::net::Ipv4Addr;

/// Address 127.0.0.1 on bare metal, 0.0.0.0 when a containerized
/// marker is present. `DOCKER_ENV` is that marker; its value is never
/// inspected, only its presence.
fn default_udp_bind_address() -> Ipv4Addr {
    if std::env::var_os("DOCKER_ENV").is_some() {
        Ipv4Addr::UNSPECIFIED
    } else {
        Ipv4Addr::LOCALHOST
    }
}

// the doc comments on this struct turn into the CLI's `--help` text.
/// A recursive DNS resolver.
///
/// Accepts DNS queries over UDP, iteratively walks the public DNS
/// hierarchy starting from the IANA root servers, and caches
/// successful answers. A `/resolve` HTTP endpoint exposes the same
/// pipeline as a JSON API, and `/metrics` exposes Prometheus metrics.
#[derive(Debug, Clone, Parser)]
pub struct Args {
    /// Address to bind the DNS UDP socket on
    #[arg(long, env = "UDP_BIND_ADDRESS", default_value_t = default_udp_bind_address())]
    pub udp_bind_address: Ipv4Addr,

    /// Port to bind the DNS UDP socket on
    #[arg(long, env = "UDP_PORT", default_value_t = 2053)]
    pub udp_port: u16,

    /// Address to serve the /resolve HTTP endpoint on
    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST)]
    pub http_interface: Ipv4Addr,

    /// Port to serve the /resolve HTTP endpoint on
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,

    /// Address to serve Prometheus metrics on
    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST)]
    pub metrics_interface: Ipv4Addr,

    /// Port to serve Prometheus metrics on
    #[arg(long, default_value_t = 9420)]
    pub metrics_port: u16,

    /// URL of a shared answer-cache store. No crate in this
    /// workspace's dependency tree provides a network KV client, so
    /// this value is read and logged but not wired to a backing
    /// store -- `dns_resolver::cache::CacheStore` is the trait
    /// boundary a real Redis-backed implementation would plug into.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Follow CNAME chains by re-querying the client's original qtype
    /// instead of this resolver's long-standing (and somewhat
    /// surprising) behavior of re-querying type CNAME. Off by default.
    #[arg(long)]
    pub fix_cname_requery_type: bool,
}
