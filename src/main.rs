use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use rs_flare::cli::{Args, Commands};
use rs_flare::collectors::providers::{HostnameResolver, SystemHostname};
use rs_flare::collectors::FlareSources;
use rs_flare::config::{load_or_default, FlareConfig};
use rs_flare::constants::UNKNOWN_HOSTNAME;
use rs_flare::security::sanitize_component;
use rs_flare::{BundleRequest, FlareBuilder};

fn main() -> Result<()> {
    let args = Args::parse();

    initialize_logging(args.verbose)?;

    if let Some(cmd) = &args.command {
        return handle_subcommand(cmd);
    }

    let config = load_config(&args)?;
    let request = build_request(&args, &config);

    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    runtime.block_on(create_flare(config, request))
}

/// Initialize logging with the specified verbosity level
fn initialize_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("Failed to initialize logger")?;
    Ok(())
}

fn handle_subcommand(cmd: &Commands) -> Result<()> {
    match cmd {
        Commands::InitConfig { path } => {
            info!("Creating default configuration file at {}", path.display());
            FlareConfig::create_default_config_file(path)?;
            info!("Configuration created successfully");
            Ok(())
        }
    }
}

/// Load the configuration file and apply command-line overrides.
fn load_config(args: &Args) -> Result<FlareConfig> {
    let mut config = load_or_default(args.config.as_deref())?;
    if let Some(secs) = args.timeout {
        config.collector_timeout_secs = secs;
    }
    if args.no_containers {
        config.container_collection = false;
    }
    Ok(config)
}

fn build_request(args: &Args, config: &FlareConfig) -> BundleRequest {
    let archive_path = args.output.clone().unwrap_or_else(default_archive_path);
    let mut request = BundleRequest::new(archive_path).local(args.local);

    if let Some(log_file) = args.log_file.as_ref().or(config.log_file.as_ref()) {
        request = request.log_file(log_file);
    }

    if args.conf_dirs.is_empty() {
        request.conf_search_paths = config.conf_search_paths.clone();
    } else {
        for (label, path) in &args.conf_dirs {
            request = request.search_path(label, path);
        }
    }
    request
}

/// `<temp>/flare-<hostname>-<timestamp>.zip`
fn default_archive_path() -> PathBuf {
    let hostname = SystemHostname
        .hostname()
        .map(|h| sanitize_component(&h))
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOSTNAME.to_string());
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    env::temp_dir().join(format!("flare-{}-{}.zip", hostname, timestamp))
}

async fn create_flare(config: FlareConfig, request: BundleRequest) -> Result<()> {
    let sources = FlareSources::system(&config);
    let builder = FlareBuilder::new(config, sources)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling flare");
            on_interrupt.cancel();
        }
    });

    let outcome = builder.create_flare_with_cancel(&request, cancel).await?;

    for failure in &outcome.degraded {
        warn!("{}", failure.as_error());
    }
    info!(
        "Flare written to {} ({} files)",
        outcome.archive_path.display(),
        outcome.files.len()
    );
    Ok(())
}
