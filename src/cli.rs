use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for rs-flare.
///
/// Values given here override the configuration file.
#[derive(Parser, Debug)]
#[clap(name = "rs-flare", about = "Build a scrubbed diagnostic archive (flare)")]
pub struct Args {
    /// Archive path (default: <temp>/flare-<hostname>-<timestamp>.zip)
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    /// Do not contact the running service; write a `local` marker instead of status
    #[clap(long)]
    pub local: bool,

    /// Service log file to include
    #[clap(long)]
    pub log_file: Option<PathBuf>,

    /// Config search root, as `label=path` or just `path` (repeatable)
    #[clap(long = "conf-dir", value_parser = parse_search_path)]
    pub conf_dirs: Vec<(String, PathBuf)>,

    /// Per-collector timeout in seconds
    #[clap(long)]
    pub timeout: Option<u64>,

    /// Skip the container collectors even when a runtime is available
    #[clap(long)]
    pub no_containers: bool,

    /// Verbose logging
    #[clap(short, long)]
    pub verbose: bool,

    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Subcommands
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a default configuration file
    InitConfig {
        /// Path to output configuration file
        #[clap(default_value = "flare.yaml")]
        path: PathBuf,
    },
}

/// Parse `label=path` or a bare `path` (empty label).
fn parse_search_path(value: &str) -> Result<(String, PathBuf), String> {
    let (label, path) = match value.split_once('=') {
        Some((label, path)) => (label.trim(), path.trim()),
        None => ("", value.trim()),
    };
    if path.is_empty() {
        return Err(format!("missing path in '{}'", value));
    }
    Ok((label.to_string(), PathBuf::from(path)))
}
