//! pipesync - Pipefy card sync
//!
//! Main entry point for the pipesync CLI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pipesync::config::{ensure_configured, validate_config_result, PipeSyncConfig};
use pipesync::integrations::PipefyClient;
use pipesync::store::{ProjectStore, SqliteProjectStore, StoreConfig};
use pipesync::sync::{metrics, run_sync, watch, CardResolver, SyncOrchestrator};
use pipesync::PipeSyncError;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Sync Pipefy cards into a local project store
#[derive(Parser, Debug)]
#[command(name = "pipesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: ~/.config/pipesync/config.yaml)
    #[arg(short, long, global = true, env = "PIPESYNC_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a configuration file
    Init,

    /// Run one sync and print the report as JSON
    Sync {
        /// Print Prometheus metrics to stderr after the run
        #[arg(long)]
        metrics: bool,
    },

    /// Sync on an interval until interrupted
    Watch {
        /// Seconds between runs (default: poll_interval_secs from config)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// List a pipe's fields with their stable identifiers
    InspectFields {
        /// Pipe id (default: first configured pipe)
        #[arg(short, long)]
        pipe: Option<String>,
    },

    /// Show recently synced projects as JSON
    Projects {
        /// Maximum number of projects (1-200)
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

fn main() {
    if let Err(e) = pipesync::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> pipesync::Result<()> {
    if let Commands::Init = cli.command {
        return handle_init_command(&cli.config);
    }

    let config = load_config(&cli.config)?;
    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Sync { metrics } => runtime.block_on(handle_sync(&config, metrics)),
        Commands::Watch { interval } => runtime.block_on(handle_watch(&config, interval)),
        Commands::InspectFields { pipe } => runtime.block_on(handle_inspect_fields(&config, pipe)),
        Commands::Projects { limit } => runtime.block_on(handle_projects(&config, limit)),
    }
}

fn load_config(config_path: &Option<String>) -> pipesync::Result<PipeSyncConfig> {
    if let Some(path) = config_path {
        return PipeSyncConfig::load(path);
    }

    match PipeSyncConfig::load_default() {
        Ok(config) => Ok(config),
        Err(PipeSyncError::Config(msg)) if msg.contains("Config file not found") => {
            Err(PipeSyncError::Config(
                "No configuration found. Run 'pipesync init' first to create one.".to_string(),
            ))
        }
        Err(e) => Err(e),
    }
}

fn open_store(config: &PipeSyncConfig) -> pipesync::Result<SqliteProjectStore> {
    let store = SqliteProjectStore::open(StoreConfig::new(config.store_path.clone()))
        .with_context(|| {
            format!("Failed to open project store at {}", config.store_path.display())
        })?;
    Ok(store)
}

fn pipefy_client(config: &PipeSyncConfig) -> pipesync::Result<PipefyClient> {
    let client = PipefyClient::from_config(config).context("Failed to create Pipefy client")?;
    Ok(client)
}

fn print_json<T: serde::Serialize>(value: &T) -> pipesync::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_init_command(config_path: &Option<String>) -> pipesync::Result<()> {
    let config_file = config_path
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(PipeSyncConfig::default_path);

    if config_file.exists() {
        println!("Configuration already exists at {}", config_file.display());
        return Ok(());
    }

    let config = PipeSyncConfig::new();
    config
        .save(&config_file)
        .with_context(|| format!("Failed to write configuration to {}", config_file.display()))?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. Export your Pipefy token:");
    println!("     export {}=<token>", config.token_env);
    println!();
    println!("  2. Add pipe ids to pipe_ids in the config file");
    println!();
    println!("  3. Find field identifiers and fill in bindings:");
    println!("     pipesync inspect-fields --pipe <pipe-id>");
    println!();
    println!("  4. Run a sync:");
    println!("     pipesync sync");

    Ok(())
}

async fn handle_sync(config: &PipeSyncConfig, show_metrics: bool) -> pipesync::Result<()> {
    ensure_configured(config)?;
    validate_config_result(config)?;

    let remote = pipefy_client(config)?;
    let store = open_store(config)?;
    let report = run_sync(config, remote, store).await?;
    print_json(&report)?;

    if show_metrics {
        eprintln!("{}", metrics::encode_metrics()?);
    }
    Ok(())
}

async fn handle_watch(config: &PipeSyncConfig, interval: Option<u64>) -> pipesync::Result<()> {
    ensure_configured(config)?;
    validate_config_result(config)?;

    let period = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.poll_interval());
    let orchestrator = SyncOrchestrator::from_config(
        config,
        pipefy_client(config)?,
        open_store(config)?,
    );

    tracing::info!(
        pipes = config.pipe_ids.len(),
        interval_secs = period.as_secs(),
        "Starting watch"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let runs = watch(&orchestrator, &config.pipe_ids, period, shutdown, |report| {
        if let Ok(json) = serde_json::to_string(report) {
            println!("{}", json);
        }
    })
    .await;

    eprintln!("Stopped after {} sync runs", runs);
    Ok(())
}

async fn handle_inspect_fields(
    config: &PipeSyncConfig,
    pipe: Option<String>,
) -> pipesync::Result<()> {
    let pipe = pipe
        .or_else(|| config.pipe_ids.first().cloned())
        .filter(|p| !p.trim().is_empty());

    let pipe = match pipe {
        Some(pipe) if config.has_credentials() => pipe,
        _ => {
            return Err(PipeSyncError::NotConfigured(format!(
                "set {} and pass --pipe or configure pipe_ids",
                config.token_env
            )))
        }
    };

    let resolver = CardResolver::new(pipefy_client(config)?);
    let fields = resolver
        .inspect_fields(&pipe)
        .await
        .with_context(|| format!("Failed to inspect fields of pipe {}", pipe))?;
    print_json(&fields)
}

async fn handle_projects(config: &PipeSyncConfig, limit: usize) -> pipesync::Result<()> {
    let store = open_store(config)?;
    let projects = store
        .list_recent(limit)
        .await
        .context("Failed to list projects")?;
    print_json(&projects)
}
