//! Management relay: entry point.
//!
//! Listens for management-console connections, authenticates each one with
//! a shared-secret challenge, and forwards authenticated requests to the
//! local management endpoint.
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>        Settings file [default: platform config dir]
//!   --port <PORT>          Override [relay].port
//!   --bind <ADDR>          Override [listener].bind_address
//!   --downstream <ADDR>    Override [downstream].address
//!   --emit-status          Print two-letter status codes to stdout
//! ```
//!
//! | Variable           | Overrides          |
//! |--------------------|--------------------|
//! | `RELAY_CONFIG`     | `--config`         |
//! | `RELAY_PORT`       | `--port`           |
//! | `RELAY_BIND`       | `--bind`           |
//! | `RELAY_DOWNSTREAM` | `--downstream`     |
//! | `RUST_LOG`         | `log_level`        |
//!
//! # Signals
//!
//! - Ctrl+C stops the relay, closing every session.
//! - `SIGHUP` (Unix) re-reads the settings file and applies its `[relay]`
//!   section.  Listener and downstream settings take effect on restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use relay_server::domain::RelayEvent;
use relay_server::infrastructure::storage::default_settings_path;
use relay_server::infrastructure::{load_settings, ChannelEventSink, RelaySettings};
use relay_server::Supervisor;

// ── CLI argument definitions ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Authenticating TCP relay for remote management consoles",
    version
)]
struct Cli {
    /// Path of the TOML settings file.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// TCP port to listen on (0 lets the OS choose).
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Interface to bind, e.g. `0.0.0.0` or `127.0.0.1`.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<String>,

    /// Local management endpoint: `host:port`, or a Unix socket path.
    #[arg(long, env = "RELAY_DOWNSTREAM")]
    downstream: Option<String>,

    /// Print each status event code (ST, ID, CN, IP, TO, RC) on its own line.
    #[arg(long)]
    emit_status: bool,
}

impl Cli {
    fn settings_path(&self) -> anyhow::Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => default_settings_path().context("no --config given and no platform config dir"),
        }
    }

    /// Command-line values win over the settings file.
    fn apply_overrides(&self, settings: &mut RelaySettings) {
        if let Some(port) = self.port {
            settings.relay.port = port;
        }
        if let Some(bind) = &self.bind {
            settings.listener.bind_address = bind.clone();
        }
        if let Some(downstream) = &self.downstream {
            settings.downstream.address = downstream.clone();
        }
    }

    fn load(&self, path: &Path) -> anyhow::Result<RelaySettings> {
        let mut settings = load_settings(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        self.apply_overrides(&mut settings);
        Ok(settings)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let path = cli.settings_path()?;
    let settings = cli.load(&path)?;

    // RUST_LOG wins; otherwise the level from the settings file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&settings.log_level)),
        )
        .init();

    info!(settings = %path.display(), "management relay starting");

    let options = settings
        .listener_options()
        .context("invalid [listener] or [downstream] settings")?;
    let (sink, events) = ChannelEventSink::new(64);
    tokio::spawn(report_events(events, cli.emit_status));

    let supervisor = Supervisor::new(options, Arc::new(sink));
    supervisor
        .start(settings.relay)
        .await
        .context("failed to start the relay")?;

    let outcome = wait_for_shutdown(&supervisor, &cli, &path).await;
    supervisor.stop().await;
    info!("management relay stopped");
    outcome
}

async fn report_events(mut events: mpsc::Receiver<RelayEvent>, emit_status: bool) {
    while let Some(event) = events.recv().await {
        if emit_status {
            println!("{event}");
        } else {
            debug!(code = event.code(), ?event, "relay event");
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown(supervisor: &Supervisor, cli: &Cli, path: &Path) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                info!("received Ctrl+C; shutting down");
                return Ok(());
            }
            _ = hangup.recv() => reload(supervisor, cli, path).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_supervisor: &Supervisor, _cli: &Cli, _path: &Path) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C; shutting down");
    Ok(())
}

/// Re-reads the settings file; on any failure the running configuration stays.
#[cfg_attr(not(unix), allow(dead_code))]
async fn reload(supervisor: &Supervisor, cli: &Cli, path: &Path) {
    info!("reloading settings");
    let settings = match cli.load(path) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("settings reload failed, keeping current configuration: {e:#}");
            return;
        }
    };
    if let Err(e) = supervisor.reconfigure(settings.relay).await {
        warn!("new configuration rejected, keeping current one: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
