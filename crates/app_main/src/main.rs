//! WebFiler - command-line client for a remote file server
//!
//! Main entry point.

mod shell;

use anyhow::Result;

fn main() -> Result<()> {
    // Initialize logging and panic hook first
    let _log_guard = app_log::init()?;

    // Clean up old logs (7 days)
    if let Err(e) = app_log::cleanup_old_logs(&app_log::log_dir(), 7) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    tracing::info!("WebFiler starting...");

    // Load configuration
    let config = app_core::AppConfig::load().unwrap_or_default();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("webfiler-worker")
        .build()?;

    runtime.block_on(async {
        // start() spawns the navigation watcher onto this runtime
        let client = app_core::init(config)?;
        client.start();
        let result = shell::run(client.clone()).await;
        client.shutdown();
        result
    })
}
