//! Drill event recording daemon.
//!
//! Accepts training-drill events over HTTP and writes them through the
//! drill store: per-day journal, per-variant table, and the aggregate
//! operations table, all behind one exclusive gate.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use drill_store::{Recorder, SessionRegistry, UploadStore};
use drilld::http::{self, AppState};

const DAEMON_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "drilld", version)]
#[command(about = "Training-drill event recording daemon")]
struct Cli {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Storage directory for the record store, journal, and uploads
    /// (or use DRILL_DATA_DIR env var)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let data_dir = cli
        .data_dir
        .or_else(|| std::env::var("DRILL_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("data"));

    info!("drilld version {DAEMON_VERSION}");
    info!("storage directory: {}", data_dir.display());

    let recorder = Arc::new(Recorder::new(&data_dir));
    let registry = Arc::new(SessionRegistry::new());
    let uploads = Arc::new(UploadStore::new(data_dir.join("uploads")));

    recorder
        .init()
        .context("Failed to initialize the record store")?;
    let restored = registry
        .rehydrate(recorder.store())
        .context("Failed to rehydrate sessions from the record store")?;
    if restored > 0 {
        info!("rehydrated {restored} session(s) from the record store");
    }

    let router = http::router(AppState {
        recorder,
        registry,
        uploads,
    });

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", cli.host, cli.port))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind drilld to {addr}"))?;
    info!("drilld listening on {addr}");

    axum::serve(listener, router.into_make_service())
        .await
        .context("HTTP server encountered an unrecoverable error")?;

    Ok(())
}
