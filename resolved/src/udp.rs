//! The UDP server front-end: decode, drop silently on a format error,
//! otherwise resolve and reply. No TCP listener, and no
//! reply-via-channel indirection -- this front-end spawns one task per
//! datagram and has that task send its own reply directly, since
//! nothing here needs a single task to own the socket for writes.

use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tracing::Instrument;

use dns_resolver::engine::Engine;
use dns_types::protocol::types::Message;

use crate::metrics::{
    DNS_REQUESTS_DROPPED_TOTAL, DNS_REQUESTS_TOTAL, DNS_RESOLVER_CACHE_HIT_TOTAL,
    DNS_RESOLVER_CACHE_MISS_TOTAL, DNS_RESPONSES_TOTAL,
};

/// Maximum accepted datagram size: standard DNS over UDP; larger
/// datagrams are truncated by the OS and decoded best-effort.
const MAX_DATAGRAM_SIZE: usize = 512;

pub async fn listen_udp_task(socket: UdpSocket, engine: Engine) {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (size, peer) = match socket.recv_from(&mut buf).await {
            Ok(result) => result,
            Err(error) => {
                tracing::debug!(%error, "UDP recv error");
                continue;
            }
        };
        DNS_REQUESTS_TOTAL.with_label_values(&["udp"]).inc();

        let datagram = buf[..size].to_vec();
        let socket = Arc::clone(&socket);
        let engine = engine.clone();
        tokio::spawn(
            async move { handle_datagram(&socket, peer, &datagram, &engine).await }
                .instrument(tracing::error_span!("udp_request", %peer)),
        );
    }
}

async fn handle_datagram(
    socket: &UdpSocket,
    peer: std::net::SocketAddr,
    datagram: &[u8],
    engine: &Engine,
) {
    let request = match Message::from_octets(datagram) {
        Ok(request) => request,
        Err(error) => {
            // Drop silently, do not reply.
            tracing::debug!(%error, "dropping unparseable datagram");
            DNS_REQUESTS_DROPPED_TOTAL.inc();
            return;
        }
    };

    let start = Instant::now();
    let (response, stats) = engine.resolve(&request).await;
    DNS_RESOLVER_CACHE_HIT_TOTAL.inc_by(u64::from(stats.cache_hits));
    DNS_RESOLVER_CACHE_MISS_TOTAL.inc_by(u64::from(stats.cache_misses));
    tracing::debug!(
        cache_hits = stats.cache_hits,
        cache_misses = stats.cache_misses,
        duration_seconds = %start.elapsed().as_secs_f64(),
        "resolved"
    );

    DNS_RESPONSES_TOTAL
        .with_label_values(&[&response.header.rcode.to_string()])
        .inc();

    match response.into_octets() {
        Ok(bytes) => {
            if let Err(error) = socket.send_to(&bytes, peer).await {
                tracing::debug!(%error, "UDP send error");
            }
        }
        Err(error) => {
            tracing::warn!(%error, "could not serialise response");
        }
    }
}
