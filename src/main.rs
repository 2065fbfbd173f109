//! thermomix-scraper main entry point
//!
//! This is the command-line interface for the recipe scraper.

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use thermomix_scraper::config::{
    apply_env_overrides, load_config_with_hash, validate, Config, RunMode,
};
use thermomix_scraper::crawler::run_scrape;
use thermomix_scraper::output::print_statistics;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Exit code after a user interruption (128 + SIGINT)
const EXIT_INTERRUPTED: u8 = 130;

/// thermomix-scraper: download recipes as JSON
///
/// Discovers every recipe through the site's search index, downloads each one
/// with a logged-in session and writes one JSON file per recipe. Interrupted
/// runs can be resumed with `--mode continue`.
#[derive(Parser, Debug)]
#[command(name = "thermomix-scraper")]
#[command(version)]
#[command(about = "Download recipes as JSON files", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE", env = "THERMOMIX_CONFIG")]
    config: Option<PathBuf>,

    /// How to treat recipes that were already downloaded
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<RunMode>,

    /// Site locale (e.g. de, en-GB)
    #[arg(short, long)]
    locale: Option<String>,

    /// Output directory for recipe files
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Account email or username
    #[arg(short, long)]
    username: Option<String>,

    /// Account password
    #[arg(short, long)]
    password: Option<String>,

    /// Download only this recipe (repeatable; "123" and "r123" are equivalent)
    #[arg(short = 'r', long = "recipe-id", value_name = "ID")]
    recipe_ids: Vec<String>,

    /// Run without a visible browser window
    #[arg(long)]
    headless: Option<bool>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn parse_mode(raw: &str) -> Result<RunMode, String> {
    raw.parse()
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet, cli.debug);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match run_scrape(config, cancel).await {
        Ok(stats) => {
            if !cli.quiet {
                print_statistics(&stats);
            }

            if stats.interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else if stats.failures > 0 {
                tracing::warn!("{} recipes failed to download", stats.failures);
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            tracing::error!("Scrape failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Layers defaults, the config file, the environment and CLI flags
fn build_config(cli: &Cli) -> anyhow::Result<Config> {
    build_config_with_env(cli, |name| std::env::var(name).ok())
}

fn build_config_with_env<F>(cli: &Cli, lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)
                .with_context(|| format!("loading {}", path.display()))?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };

    apply_env_overrides(&mut config, lookup).context("reading environment overrides")?;

    if let Some(mode) = cli.mode {
        config.run.mode = mode;
    }
    if let Some(locale) = &cli.locale {
        config.site.locale = locale.clone();
    }
    if let Some(output) = &cli.output {
        config.output.directory = output.clone();
    }
    if let Some(username) = &cli.username {
        config.credentials.username = Some(username.clone());
    }
    if let Some(password) = &cli.password {
        config.credentials.password = Some(password.clone());
    }
    if !cli.recipe_ids.is_empty() {
        config.run.recipe_ids = cli.recipe_ids.clone();
    }
    if let Some(headless) = cli.headless {
        config.run.headless = headless;
    }
    config.run.debug |= cli.debug;

    validate(&config)?;
    Ok(config)
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool, debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            // Only show errors
            EnvFilter::new("error")
        } else {
            match verbose.max(u8::from(debug)) {
                0 => EnvFilter::new("thermomix_scraper=info,warn"),
                1 => EnvFilter::new("thermomix_scraper=debug,info"),
                2 => EnvFilter::new("thermomix_scraper=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Cancels the run on SIGINT/SIGTERM (Ctrl+C elsewhere)
async fn cancel_on_signal(cancel: CancellationToken) {
    wait_for_signal().await;
    tracing::info!("Stopping after the current recipe, progress will be saved");
    cancel.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("Could not register signal handlers ({}), using Ctrl+C", e);
            if tokio::signal::ctrl_c().await.is_err() {
                // Never cancel if no handler can be installed
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
