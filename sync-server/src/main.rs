//! Server binary entry point.
//!
//! Resolves network options from flags and `LOGUX_*` environment
//! variables, loads tuning configuration from `server.toml` when present
//! and runs the core until interrupted.
//!
//! ```bash
//! actionsync-server --port 31337
//! LOGUX_HOST=0.0.0.0 actionsync-server
//! ```

use actionsync_server::config::Config;
use actionsync_server::hooks::OpenAccess;
use actionsync_server::options::{resolve, ExplicitOptions};
use actionsync_server::reporter::LogReporter;
use actionsync_server::server::SyncServer;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const CONFIG_PATH: &str = "server.toml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(error) = run().await {
        tracing::error!(%error, "fatal");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), actionsync_server::error::ServerError> {
    let explicit = ExplicitOptions {
        subprotocol: Some(env!("CARGO_PKG_VERSION").to_string()),
        supports: Some(format!("{}.x", env!("CARGO_PKG_VERSION_MAJOR"))),
        ..ExplicitOptions::default()
    };
    let argv: Vec<String> = std::env::args().collect();
    let env: std::collections::HashMap<String, String> = std::env::vars().collect();
    let options = resolve(explicit, &argv, &env)?;

    let config = if Path::new(CONFIG_PATH).exists() {
        Config::from_file(Path::new(CONFIG_PATH))?
    } else {
        Config::default()
    };

    let mut server = SyncServer::new(options, config, Arc::new(LogReporter))?;
    server.set_authenticator(Arc::new(OpenAccess));
    let server = Arc::new(server);

    server.listen()?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| tracing::warn!(error = %e, "signal handler failed"))
        .ok();

    tracing::info!("shutting down");
    server.destroy().await;
    Ok(())
}
