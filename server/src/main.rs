//! mydocs binary — thin CLI shell over the [`mydocs_server`] library crate.

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

use mydocs_server::config::{ServerConfig, WatcherConfig};
use mydocs_server::mcp::run_stdio;
use mydocs_server::types::ServerState;
use mydocs_server::watch::FileWatcher;

// ---------------------------------------------------------------------------
// CLI definition (clap derive)
// ---------------------------------------------------------------------------

/// Personal document indexer and search server — MCP server over stdio.
#[derive(Parser)]
#[command(name = "mydocs", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Transport to serve on (only stdio is supported)
    #[arg(long)]
    transport: Option<String>,

    /// Log level: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,

    /// Mirror logs into this file (stderr is always used)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Database URL, sqlite:///path/to/mydocs.db
    #[arg(long)]
    database_url: Option<String>,

    /// Root directory for document data
    #[arg(long)]
    document_root: Option<PathBuf>,

    /// Enable debug logging and verbose diagnostics
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_tracing(config: &ServerConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let level = if config.debug { "debug".to_string() } else { config.log_level.to_lowercase() };
    let level = if level == "warning" { "warn".to_string() } else { level };

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("mydocs={level}").parse().expect("log directive"))
        .add_directive(format!("mydocs_server={level}").parse().expect("log directive"));

    // Stdout carries JSON-RPC frames; all logging goes to stderr or a file.
    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| {
                    eprintln!("Error: cannot open log file {}: {e}", path.display());
                    std::process::exit(1);
                });
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_target(false)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown signal
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = &cli.command {
        clap_complete::generate(*shell, &mut Cli::command(), "mydocs", &mut std::io::stdout());
        return;
    }

    // Environment first, CLI flags on top.
    let mut config = ServerConfig::from_env();
    if let Some(transport) = cli.transport {
        config.transport = transport;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level.to_uppercase();
    }
    if let Some(log_file) = cli.log_file {
        config.log_file = Some(log_file);
    }
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }
    if let Some(document_root) = cli.document_root {
        config.document_root = document_root;
    }
    if cli.debug {
        config.debug = true;
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: invalid configuration: {e}");
        std::process::exit(1);
    }
    if let Err(e) = config.ensure_directories() {
        eprintln!("Error: cannot create data directories: {e}");
        std::process::exit(1);
    }

    let _log_guard = init_tracing(&config);
    info!(
        transport = config.transport.as_str(),
        database_url = config.database_url.as_str(),
        "Starting mydocs server"
    );

    // Store, migrations, parsers, search engine, tool table.
    let state = match ServerState::initialize(config.clone()).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!(error = e.as_str(), "Startup failed");
            std::process::exit(1);
        }
    };
    if let Ok(stats) = state.store.statistics().await {
        info!(
            documents = stats.total_documents,
            index_entries = stats.index_entries,
            cache_entries = stats.cache_entries,
            "Store statistics"
        );
    }

    // File watcher: optional, never fatal. Directories come from the
    // MYDOCS_WATCH_* environment; DOCUMENT_ROOT is watched by default.
    let mut watcher_config = WatcherConfig::from_env();
    if watcher_config.watch_directories.is_empty() {
        watcher_config.watch_directories = vec![config.document_root.clone()];
    }
    let mut watcher =
        FileWatcher::new(watcher_config, Arc::clone(&state.store), Arc::clone(&state.index_tool));
    match watcher.start() {
        Ok(count) => {
            info!(directories = count, "File watcher active");
            info!(config = %watcher.summary(), "Watch configuration");
        }
        Err(e) => warn!(error = e.as_str(), "File watcher disabled"),
    }

    // Periodic cache sweep; staleness is bounded by the TTL.
    let sweeper = {
        let store = Arc::clone(&state.store);
        let period = state.engine.cache_ttl();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = store.sweep_expired_cache().await {
                    warn!(error = %e, "Cache sweep failed");
                }
            }
        })
    };

    // Serve until stdin closes or a signal arrives.
    let serve = run_stdio(Arc::clone(&state));
    tokio::select! {
        result = serve => {
            match result {
                Ok(()) => info!("stdin closed, shutting down..."),
                Err(e) => {
                    error!(error = %e, "Transport failed");
                    watcher.stop().await;
                    sweeper.abort();
                    state.close();
                    std::process::exit(1);
                }
            }
        }
        _ = shutdown_signal() => {}
    }

    watcher.stop().await;
    sweeper.abort();
    state.close();
    info!("Shutdown complete");
}
