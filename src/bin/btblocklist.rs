//! btblocklist: keeps a gzip blocklist built from RIPE ranges and external lists.

use btblocklist::{CacheStore, Exporter, Updater, UpdaterConfig};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// How often the `run` command looks for a new blob to export.
const EXPORT_POLL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "btblocklist")]
#[command(version)]
#[command(about = "Merge RIPE ranges and external IP lists into one gzip blocklist", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh periodically until interrupted
    Run {
        /// YAML configuration file
        #[arg(short, long, default_value = "btblocklist.yml")]
        config: PathBuf,
    },

    /// Run a single batch and write the blob
    Once {
        /// YAML configuration file
        #[arg(short, long, default_value = "btblocklist.yml")]
        config: PathBuf,

        /// Output file, overrides `output` from the configuration
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file
    Check {
        /// YAML configuration file
        #[arg(short, long, default_value = "btblocklist.yml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let result = match cli.command {
        Commands::Run { config } => run(&config).await,
        Commands::Once { config, output } => once(&config, output).await,
        Commands::Check { config } => check(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = UpdaterConfig::load(config_path)?;
    let cache = Arc::new(CacheStore::new());
    let updater = Updater::from_config(&config, Arc::clone(&cache))?;
    let mut exporter = config.output.as_ref().map(Exporter::new);

    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(updater.run(shutdown.clone()));

    let interrupted = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Can't listen for Ctrl-C: {}", e);
        }
        log::info!("Interrupted, waiting for the current batch to finish");
    };
    match exporter {
        Some(ref mut exporter) => exporter.export_until(&cache, EXPORT_POLL, interrupted).await,
        None => interrupted.await,
    }

    shutdown.cancel();
    worker.await?;
    if let Some(ref mut exporter) = exporter {
        exporter.export_if_changed(&cache)?;
    }
    Ok(())
}

async fn once(
    config_path: &Path,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = UpdaterConfig::load(config_path)?;
    let output = output
        .or(config.output.clone())
        .ok_or("no output file: pass --output or set `output` in the configuration")?;

    let cache = Arc::new(CacheStore::new());
    let mut updater = Updater::from_config(&config, Arc::clone(&cache))?;
    let report = updater.run_batch().await;
    println!("{}", report.status);

    if !Exporter::new(&output).export_if_changed(&cache)? {
        return Err("no data could be compiled".into());
    }
    println!("Wrote {:?}", output);
    Ok(())
}

fn check(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = UpdaterConfig::load(config_path)?;
    println!(
        "{:?}: OK (search '{}', {} external list(s), every {}s)",
        config_path,
        config.ripe.search,
        config.blocklists.len(),
        config.frequency_secs
    );
    Ok(())
}
