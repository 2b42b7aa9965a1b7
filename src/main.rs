//! # callwire
//!
//! Signaling relay server binary. Loads settings, opens the call-session
//! database, and serves `/ws` until interrupted.

mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use callwire_server::SignalingServer;
use callwire_settings::CallwireSettings;
use callwire_store::{CallSessionRepo, CallSessionStore, Database};
use clap::Parser;
use tracing::{info, warn};

/// WebRTC signaling relay.
#[derive(Parser, Debug)]
#[command(name = "callwire", about = "WebRTC signaling relay server")]
struct Cli {
    /// Settings file (defaults to ~/.callwire/settings.json).
    #[arg(long, env = "CALLWIRE_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn load_settings(&self) -> Result<CallwireSettings> {
        let mut settings = match &self.config {
            Some(path) => callwire_settings::load_settings_from_path(path)
                .with_context(|| format!("loading settings from {}", path.display()))?,
            None => callwire_settings::load_settings().context("loading settings")?,
        };
        self.apply(&mut settings);
        Ok(settings)
    }

    /// Command-line flags override every other layer.
    fn apply(&self, settings: &mut CallwireSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

fn open_store(settings: &CallwireSettings) -> Result<Option<Arc<dyn CallSessionStore>>> {
    if !settings.database.call_tracking {
        info!("call tracking disabled");
        return Ok(None);
    }
    let path = settings.database.resolved_path();
    let db = Database::open(&path)
        .with_context(|| format!("opening database at {}", path.display()))?;
    Ok(Some(Arc::new(CallSessionRepo::new(db))))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    telemetry::init(&settings.logging)?;
    settings.validate().context("invalid settings")?;

    let store = open_store(&settings)?;
    let metrics_handle = match callwire_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "metrics disabled");
            None
        }
    };

    let server = SignalingServer::from_settings(&settings, store, metrics_handle)
        .context("building server")?;
    let (addr, handle) = server.listen().await.context("binding listener")?;
    info!(%addr, "callwire ready");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("shutting down");

    let grace = server.shutdown_timeout();
    if !server.drain_sessions(grace).await {
        warn!(timeout_secs = grace.as_secs(), "sessions still open after grace period");
    }
    if tokio::time::timeout(grace, handle).await.is_err() {
        warn!("listener did not stop in time");
    }
    Ok(())
}
