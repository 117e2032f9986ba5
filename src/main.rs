#!/usr/bin/env cargo run --release

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use packet_ingest::bootstrap::{run_preflight, BootstrapSequencer};
use packet_ingest::config::{DEFAULT_CONFIG_FILE, PipelineConfig};
use packet_ingest::pipeline::{ensure_directories, Pipeline};

#[derive(Parser)]
#[command(name = "packet-ingest")]
#[command(about = "Watch capture files, clean them and ship them to bulk ingestion", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Run the installation and path checks without asking
    #[arg(long)]
    check: bool,

    /// Never prompt; skip the checks unless --check is given
    #[arg(long)]
    no_prompt: bool,

    /// Assume the services are already running and don't start the capture
    #[arg(long)]
    skip_bootstrap: bool,

    /// Override the log directory from the config file
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let log_dir = cli.log_dir.clone().unwrap_or_else(|| config.logging.dir.clone());
    let _guards = init_logging(&log_dir, &config.logging.filter);

    info!("🚀 Starting Packet Ingest");
    debug!(
        "Raw dir {}, cleaned dir {}, ingest {} via pipeline '{}' as {:?}",
        config.paths.raw_dir.display(),
        config.paths.cleaned_dir.display(),
        config.ingest.endpoint,
        config.ingest.pipeline,
        config.ingest.credentials()
    );
    if !cli.config.exists() {
        warn!("{} not found, running with defaults", cli.config.display());
    }

    // STEP 1: Optional installation and path checks
    if should_run_preflight(&cli)? {
        // Err from main exits with status 1 after the log guards flush
        if let Err(e) = run_preflight(&config).await {
            error!("❌ {}", e);
            return Err(e).context("Pre-flight checks failed");
        }
    }

    ensure_directories(&config)
        .await
        .context("Failed to create data directories")?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    // STEP 2: Seed the watchers before the capture can write anything
    let pipeline = Pipeline::build(&config, &cancel)
        .await
        .context("Failed to initialize watchers")?;

    // STEP 3: Bring up the stack and the capture
    let mut sequencer = BootstrapSequencer::new(&config, Some(log_dir.clone()))?;
    if cli.skip_bootstrap {
        info!("Skipping service bootstrap");
    } else if let Err(e) = sequencer.run(&cancel).await {
        error!("❌ Bootstrap failed: {}", e);
        sequencer.shutdown().await;
        return Err(e).context("Failed to start dependent services");
    }

    // STEP 4: Watch, clean, dispatch until Ctrl-C
    pipeline.run(cancel.clone()).await;

    sequencer.shutdown().await;
    info!("🏁 Packet Ingest stopped");
    Ok(())
}

/// Console + daily rolling file output, as non-blocking writers
fn init_logging(
    log_dir: &Path,
    default_filter: &str,
) -> (
    tracing_appender::non_blocking::WorkerGuard,
    tracing_appender::non_blocking::WorkerGuard,
) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    std::fs::create_dir_all(log_dir).unwrap_or_else(|e| {
        eprintln!("Failed to create logs directory: {}", e);
    });

    let file_appender = rolling::daily(log_dir, "packet-ingest.log");
    let (non_blocking_file, file_guard) = non_blocking(file_appender);
    let (non_blocking_console, console_guard) = non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking_console)
                .with_target(false)
                .with_ansi(true),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_target(true)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    (file_guard, console_guard)
}

fn should_run_preflight(cli: &Cli) -> Result<bool> {
    if cli.check {
        return Ok(true);
    }
    if cli.no_prompt {
        return Ok(false);
    }

    print!("Do you need to check the paths or installations? (Y/N): ");
    io::stdout().flush().context("Failed to write prompt")?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;
    Ok(matches!(answer.trim(), "Y" | "y"))
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, stopping watchers...");
                cancel.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C, stop the process to exit: {}", e),
        }
    });
}
