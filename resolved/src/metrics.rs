//! Prometheus metrics, served over their own small `actix-web` app.
//!
//! A `lazy_static!` block of `prometheus` collectors plus a single
//! `/metrics` handler that encodes the default registry to text.
//! Covers the counters this engine actually has something to say
//! about: no TCP-transport label (TCP is a non-goal here), and no
//! authoritative/override/blocked counters (there is no zone
//! authority layer).

use actix_web::{get, http::header::ContentType, App, HttpResponse, HttpServer, Responder};
use lazy_static::lazy_static;
use prometheus::{
    opts, register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::net::Ipv4Addr;

pub const RESPONSE_TIME_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.075, 0.100, 0.250, 0.500, 0.750, 1.000, 2.500, 5.000,
    10.000,
];

lazy_static! {
    /// Total requests received, labelled by the front-end that
    /// received them: `udp` or `http`.
    pub static ref DNS_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!(
            "dns_requests_total",
            "Total number of requests received, whether valid or invalid."
        ),
        &["protocol"]
    )
    .unwrap();

    /// Total responses sent, labelled by their final rcode.
    pub static ref DNS_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("dns_responses_total", "Total number of responses sent."),
        &["rcode"]
    )
    .unwrap();

    /// Malformed inbound datagrams dropped without a reply.
    pub static ref DNS_REQUESTS_DROPPED_TOTAL: IntCounter = register_int_counter!(opts!(
        "dns_requests_dropped_total",
        "Total number of inbound datagrams dropped because they could not be parsed."
    ))
    .unwrap();

    pub static ref DNS_RESOLVER_CACHE_HIT_TOTAL: IntCounter = register_int_counter!(opts!(
        "dns_resolver_cache_hit_total",
        "Total number of answer-cache hits."
    ))
    .unwrap();

    pub static ref DNS_RESOLVER_CACHE_MISS_TOTAL: IntCounter = register_int_counter!(opts!(
        "dns_resolver_cache_miss_total",
        "Total number of answer-cache misses."
    ))
    .unwrap();

    /// Time spent resolving a single question end-to-end (cache
    /// lookup plus, on a miss, the full iterative walk).
    pub static ref DNS_QUESTION_PROCESSING_TIME_SECONDS: HistogramVec = register_histogram_vec!(
        "dns_question_processing_time_seconds",
        "Time spent resolving a single question.",
        &["qtype"],
        RESPONSE_TIME_BUCKETS.to_vec()
    )
    .unwrap();
}

#[get("/metrics")]
async fn get_metrics() -> impl Responder {
    match prometheus::TextEncoder::new().encode_to_string(&prometheus::gather()) {
        Ok(metrics_str) => HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(metrics_str),
        Err(error) => {
            tracing::warn!(%error, "could not encode metrics");
            HttpResponse::InternalServerError()
                .content_type(ContentType::plaintext())
                .body(error.to_string())
        }
    }
}

pub async fn serve_prometheus_endpoint_task(address: Ipv4Addr, port: u16) -> std::io::Result<()> {
    HttpServer::new(|| App::new().service(get_metrics))
        .bind((address, port))?
        .run()
        .await
}
