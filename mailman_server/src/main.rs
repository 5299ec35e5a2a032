//! This crate implements an iCalendar server serving the upcoming mail delivery days of a
//! Norwegian postal code as all-day events.
//!
//! The path is the postal code, e.g. `/0150`.

mod logging;
mod route;

use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Result;
use axum::Router;
use clap::Parser;
use mailman_core::{
    calendar_builder::CalendarBuilder,
    clock::{Clock, SystemClock},
    config::{CacheArgs, CacheConfig, Config, CoreArgs},
    schedule_fetcher::ScheduleFetcher,
    service::{CalendarCache, CalendarService},
};
use serde::Serialize;
use tokio::{net::TcpListener, signal, sync::Notify};
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(about = "Serves upcoming mail delivery days as an iCalendar feed")]
pub struct Arguments {
    /// port to listen on
    #[arg(long, env = "MATT_PORT", default_value_t = 3000)]
    pub port: u16,
    #[command(flatten)]
    pub core: CoreArgs,
    #[command(flatten)]
    pub cache: CacheArgs,
    /// time in-flight requests get to finish on shutdown
    #[arg(long, env = "MATT_SHUTDOWN_GRACE", default_value = "10s", value_parser = humantime::parse_duration)]
    pub shutdown_grace: Duration,
    /// log level of this application, overridden by RUST_LOG
    #[arg(long, env = "MATT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    /// log JSON lines
    #[arg(long, env = "MATT_LOG_JSON")]
    pub log_json: bool,
    /// log the source location of every record
    #[arg(long, env = "MATT_LOG_SOURCE")]
    pub log_source: bool,
    /// log the effective configuration at startup
    #[arg(long, env = "MATT_DUMP_CONFIG")]
    pub dump_config: bool,
}

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    port: u16,
    #[serde(flatten)]
    core: &'a Config,
    cache: &'a CacheConfig,
    shutdown_grace: Duration,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Arguments::parse();
    logging::init(&args.log_level, args.log_json, args.log_source);

    let config = args.core.into_config()?;
    let cache_config = CacheConfig::from(args.cache);
    if args.dump_config {
        let effective = EffectiveConfig {
            port: args.port,
            core: &config,
            cache: &cache_config,
            shutdown_grace: args.shutdown_grace,
        };
        info!("configuration:\n{}", serde_json::to_string_pretty(&effective)?);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let cache = Arc::new(CalendarCache::new(cache_config.capacity, clock.clone()));
    let sweeper = cache.spawn_sweeper(cache_config.sweep_interval);
    let fetcher = ScheduleFetcher::from_config(&config, clock.clone())?;
    let builder = CalendarBuilder::new(config.calendar.clone(), clock.clone());
    let service = CalendarService::new(
        Arc::new(fetcher),
        builder,
        cache,
        clock,
        config.fetcher.timeout,
    );
    let app = route::router(Arc::new(service));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "starting web server");
    serve(listener, app, args.shutdown_grace).await?;
    sweeper.abort();
    info!("server stopped");
    Ok(())
}

/// Serve until a shutdown signal arrives, then give in-flight requests `grace` to finish.
async fn serve(listener: TcpListener, app: Router, grace: Duration) -> std::io::Result<()> {
    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = Arc::clone(&shutdown);
            async move {
                shutdown_signal().await;
                info!("stopping the server");
                shutdown.notify_one();
            }
        })
        .into_future();
    tokio::select! {
        result = server => result,
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(grace = %humantime::format_duration(grace), "grace period elapsed, dropping open connections");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
