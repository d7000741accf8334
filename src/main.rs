//! blobcache entry point: argument parsing, bring-up, serving.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tokio::sync::{watch, Mutex};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use blobcache::api::server::{start_server, AppState};
use blobcache::maintenance::{Maintainer, REFRESH_INTERVAL};
use blobcache::storage::Store;

/// Cache root, relative to the working directory.
const CACHE_DIR: &str = "cache";

const DEFAULT_PORT: u16 = 8801;

#[derive(Parser, Debug)]
#[command(name = "blobcache", version, about = "A server for caching files")]
struct Args {
    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Enable verbose debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug {
        "blobcache=debug,tower_http=debug"
    } else {
        "blobcache=info"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Startup pass: build the index from whatever survived on disk before
    // accepting any traffic.
    let mut store = Store::new(CACHE_DIR);
    store
        .refresh(Local::now().naive_local())
        .with_context(|| format!("failed to build the cache index under {CACHE_DIR:?}"))?;

    let store = Arc::new(Mutex::new(store));
    let state = Arc::new(AppState::new(store.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let maintenance = tokio::spawn(Maintainer::new(REFRESH_INTERVAL).run(store, shutdown_rx));

    println!("Running the files caching server on the port {}...", args.port);
    let served = start_server(args.port, state).await;

    let _ = shutdown_tx.send(true);
    let _ = maintenance.await;
    served.map_err(|err| anyhow::anyhow!("server error: {err}"))
}
