//! Application entrypoint and state wiring.

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use tracing::{error, info, warn};

use identity_ledger::config::{Args, Command, LogFormat};
use identity_ledger::{console, routes, AppState, FileSnapshotStore, Ledger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let store = Arc::new(FileSnapshotStore::new(&args.data_dir, &args.snapshot_file));
    info!(path = %store.path().display(), "snapshot location");
    let mut ledger =
        Ledger::initialize(store, args.on_corrupt.into()).context("initialize ledger")?;

    match args.command {
        Command::Serve { listen } => serve(ledger, listen).await?,
        Command::Console => {
            tokio::task::spawn_blocking(move || {
                console::run(&mut ledger, std::io::stdin().lock(), std::io::stdout().lock())
            })
            .await
            .context("console task")?
            .context("console io")?;
        }
        Command::Verify => {
            let status = ledger.is_chain_valid();
            let mut out = std::io::stdout().lock();
            console::print_status(&status, &mut out)?;
            out.flush()?;
            if !status.is_valid() {
                std::process::exit(1);
            }
        }
        Command::Repair => {
            let report = ledger.repair_chain().context("repair chain")?;
            console::print_repair(&report, &mut std::io::stdout().lock())?;
        }
        Command::Show => console::print_chain(&ledger, &mut std::io::stdout().lock())?,
    }
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn serve(ledger: Ledger, addr: SocketAddr) -> anyhow::Result<()> {
    if let Some(index) = ledger.is_chain_valid().tampered_index() {
        warn!(index, "starting with a broken chain; registrations are disabled until repair");
    }

    let state = AppState::new(ledger);
    let app = routes::router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    match state.ledger.lock() {
        Ok(ledger) => ledger.flush().context("flush ledger on shutdown")?,
        Err(_) => error!("ledger lock poisoned; skipping final flush"),
    }
    info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
