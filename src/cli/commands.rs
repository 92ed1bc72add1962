//! CLI command implementations
//!
//! Each command loads configuration, installs logging and then runs its
//! async part on a fresh multi-threaded runtime.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info};

use crate::config::Config;
use crate::engine::Engine;
use crate::lifecycle::{bind, wait_for_shutdown_signal, Lifecycle};
use crate::observability::init_logging;
use crate::storage::Store;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, memory } => serve(config.as_deref(), memory),
        Command::Bootstrap { config } => bootstrap(config.as_deref()),
    }
}

fn load(config_path: Option<&Path>) -> CliResult<Config> {
    let config = Config::load_from(config_path)?;

    init_logging(config.env)
        .map_err(|e| CliError::io_error(format!("Failed to install logger: {}", e)))?;
    info!(env = %config.env, "start settings");
    debug!("debug enabled");

    Ok(config)
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("Failed to create tokio runtime: {}", e)))
}

/// Run the service until SIGINT or SIGTERM
///
/// Order: connect, bootstrap, bind, serve, drain, close.
pub fn serve(config_path: Option<&Path>, memory: bool) -> CliResult<()> {
    let config = load(config_path)?;
    let lifecycle = Lifecycle::new();

    runtime()?.block_on(async {
        if memory {
            let store = lifecycle.start_in_memory(&config.db.space)?;
            run_server(&lifecycle, &config, store).await
        } else {
            let db = config.require_db()?;
            let store = lifecycle.start(db).await?;
            run_server(&lifecycle, &config, store).await
        }
    })
}

async fn run_server<E: Engine>(
    lifecycle: &Lifecycle,
    config: &Config,
    store: Store<E>,
) -> CliResult<()> {
    let listener = bind(&config.http_server).await?;
    info!(address = %config.http_server.address, "starting server");

    let shutdown = async {
        let signal = wait_for_shutdown_signal().await;
        info!(signal, "stopping server");
    };

    lifecycle
        .serve(Arc::new(store), &config.http_server, listener, shutdown)
        .await?;

    info!("server stopped");
    Ok(())
}

/// Provision the space, print its id and exit
pub fn bootstrap(config_path: Option<&Path>) -> CliResult<()> {
    let config = load(config_path)?;
    let db = config.require_db()?;
    let lifecycle = Lifecycle::new();

    let space = runtime()?.block_on(async {
        let store = lifecycle.start(db).await?;
        let deadline = tokio::time::Instant::now() + db.request_timeout();
        if let Err(err) = store.close(deadline).await {
            tracing::warn!(error = %err, "failed to close engine connection");
        }
        Ok::<_, CliError>(store.space().clone())
    })?;

    write_response(json!({
        "space": space.name,
        "id": space.id,
    }))
}
