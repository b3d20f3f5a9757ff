//! Trash level sampling service: hourly passes plus an HTTP manual trigger.

mod config;
mod routes;
mod schedule;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use binlevel_core::SamplingService;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::parse();

    // Stores + service setup
    let plugin = config.plugin()?;
    let mut service = SamplingService::new(plugin, config.sampler_options());
    if config.exclusive_passes {
        service = service.exclusive();
    }
    let service = Arc::new(service);
    info!(
        backend = service.backend(),
        exclusive = config.exclusive_passes,
        "Sampling service ready"
    );

    let scheduler = if config.no_schedule {
        info!("Scheduled passes disabled");
        None
    } else {
        Some(tokio::spawn(schedule::run(
            Arc::clone(&service),
            config.schedule_minute,
        )))
    };

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Server running on port {}", config.port);

    axum::serve(listener, routes::make_app(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.abort();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}
