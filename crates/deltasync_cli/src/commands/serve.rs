//! Serve command implementation.

use deltasync_server::{ServerConfig, SyncServer};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Runs the sync server until Ctrl-C.
pub fn run(
    bind: SocketAddr,
    data_dir: Option<PathBuf>,
    max_push_records: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::new(bind).with_max_push_records(max_push_records);
    match data_dir {
        Some(dir) => config = config.with_data_dir(dir),
        None => tracing::warn!("no --data-dir given, data will not survive a restart"),
    }

    let server = SyncServer::new(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.serve(shutdown_signal()))?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
