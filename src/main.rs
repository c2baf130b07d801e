//! shadow-relay
//!
//! Relays HTTP/1 traffic to a primary upstream and mirrors each request to
//! any number of shadow upstreams.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──▶ net::listener ──▶ http::server ──▶ http::handler
//!                                                     │
//!                                    capture body once (http::request)
//!                                                     │
//!                         ┌───────────────────────────┼──────────────────────────┐
//!                         ▼                           ▼                          ▼
//!                 forward (primary)          forward (shadow 1)   ...   forward (shadow N)
//!                 AwaitResponse              FireAndForget              FireAndForget
//!                         │
//!   client ◀── http::response ◀─┘
//!
//!   SIGHUP ──▶ config::reload ──▶ config::store (ArcSwap) ──▶ read at start of each request
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use shadow_relay::config::{ConfigStore, ReloadSupervisor};
use shadow_relay::forward::ForwardDispatcher;
use shadow_relay::http::RelayServer;
use shadow_relay::lifecycle::{signals, Shutdown};
use shadow_relay::net::Listener;
use shadow_relay::observability::{logging, metrics};
use shadow_relay::resilience::DispatchTimeouts;

#[derive(Parser, Debug)]
#[command(name = "shadow-relay", version)]
#[command(about = "HTTP relay that mirrors requests to shadow upstreams", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short = 'f', long = "file", default_value = "config.json")]
    file: PathBuf,

    /// Debug messages
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// Seconds allowed to open an upstream connection
    #[arg(long, default_value_t = 10)]
    connect_timeout_secs: u64,

    /// Seconds allowed for an upstream to answer
    #[arg(long, default_value_t = 10)]
    read_timeout_secs: u64,

    /// Maximum concurrent inbound connections
    #[arg(long, default_value_t = 10_000)]
    max_connections: usize,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(cli.debug);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "shadow-relay starting");

    let store = match ConfigStore::load(&cli.file) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(path = %cli.file.display(), error = %e, "Cannot load configuration, not serving");
            return Err(e.into());
        }
    };

    let config = store.current();
    tracing::info!(
        path = %cli.file.display(),
        listen = %config.listen,
        proxy = %config.proxy,
        forwards = config.forwards.len(),
        "Configuration loaded"
    );

    if let Some(addr) = cli.metrics_address {
        metrics::init_metrics(addr)?;
    }

    let listener = Listener::bind(&config.listen, cli.max_connections).await?;

    let reloads = signals::reload_notifications()?;
    tokio::spawn(ReloadSupervisor::new(Arc::clone(&store), cli.file.clone()).run(reloads));

    let timeouts = DispatchTimeouts::from_secs(cli.connect_timeout_secs, cli.read_timeout_secs);
    let server = RelayServer::new(store, ForwardDispatcher::new(timeouts));

    let shutdown = Shutdown::new();
    let mut server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::select! {
        result = &mut server_task => result??,
        _ = signals::shutdown_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
