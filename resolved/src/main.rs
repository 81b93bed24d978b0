//! `resolved`: the recursive DNS resolver binary. Ties together the
//! UDP server front-end, the HTTP forwarding endpoint, and the
//! Prometheus metrics endpoint around a shared
//! `dns_resolver::engine::Engine`, each running as its own
//! `tokio::spawn`ed task under one `tokio::main`.

mod config;
mod http;
mod metrics;
mod udp;

use std::collections::HashSet;
use std::env;
use std::process;

use clap::Parser;
use tokio::net::UdpSocket;
use tracing_subscriber::EnvFilter;

use config::Args;
use dns_resolver::cache::AnswerCache;
use dns_resolver::engine::{Config as EngineConfig, Engine};
use metrics::serve_prometheus_endpoint_task;

/// A `RUST_LOG_FORMAT` environment variable (comma-separated flags
/// among `json`/`pretty`/`compact`/`no-ansi`/`no-time`) layered on top
/// of `tracing_subscriber`'s `EnvFilter::from_default_env()`.
fn begin_logging() {
    let log_format: HashSet<String> = env::var("RUST_LOG_FORMAT")
        .map(|var| var.split(',').map(str::to_string).collect())
        .unwrap_or_default();

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("compact") {
        if log_format.contains("no-time") {
            logger.compact().without_time().init();
        } else {
            logger.compact().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    begin_logging();

    if let Some(redis_url) = &args.redis_url {
        tracing::warn!(
            %redis_url,
            "REDIS_URL is configured but this build has no redis-backed CacheStore wired in; \
             falling back to an in-memory cache"
        );
    }

    let engine = Engine::new(
        AnswerCache::in_memory(),
        EngineConfig {
            fix_cname_requery_type: args.fix_cname_requery_type,
        },
    );

    tracing::info!(
        address = %args.udp_bind_address,
        port = %args.udp_port,
        "binding DNS UDP socket"
    );
    let udp_socket = match UdpSocket::bind((args.udp_bind_address, args.udp_port)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(%error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };

    let udp_task = tokio::spawn(udp::listen_udp_task(udp_socket, engine.clone()));

    tracing::info!(
        address = %args.http_interface,
        port = %args.http_port,
        "binding HTTP resolve-endpoint socket"
    );
    let http_task = tokio::spawn(serve_http_endpoint(
        args.http_interface,
        args.http_port,
        engine,
    ));

    tracing::info!(
        address = %args.metrics_interface,
        port = %args.metrics_port,
        "binding Prometheus metrics socket"
    );
    let metrics_task = tokio::spawn(serve_prometheus_endpoint_task(
        args.metrics_interface,
        args.metrics_port,
    ));

    tokio::select! {
        result = udp_task => {
            if let Err(error) = result {
                tracing::error!(%error, "UDP listener task panicked");
            }
        }
        result = http_task => {
            match result {
                Ok(Err(error)) => tracing::error!(%error, "HTTP resolve endpoint failed"),
                Err(error) => tracing::error!(%error, "HTTP resolve endpoint task panicked"),
                Ok(Ok(())) => {}
            }
        }
        result = metrics_task => {
            match result {
                Ok(Err(error)) => tracing::error!(%error, "metrics endpoint failed"),
                Err(error) => tracing::error!(%error, "metrics endpoint task panicked"),
                Ok(Ok(())) => {}
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
        }
    }
}

async fn serve_http_endpoint(
    address: std::net::Ipv4Addr,
    port: u16,
    engine: Engine,
) -> std::io::Result<()> {
    use actix_web::{web, App, HttpServer};

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(engine.clone()))
            .service(http::resolve_handler)
    })
    .bind((address, port))?
    .run()
    .await
}
