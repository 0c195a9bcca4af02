use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::env_vars::{expand_env_vars, normalize_path_for_os};
use crate::constants::{DEFAULT_COLLECTOR_TIMEOUT_SECS, DEFAULT_CONFIG_EXTENSIONS, REDACTION_MARKER};
use crate::models::SearchPaths;
use crate::security::credential_scrubber::Scrubber;

/// An extra redaction rule applied to every collector's output.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RedactionRule {
    pub pattern: String,
    #[serde(default = "default_replacement")]
    pub replacement: String,
}

fn default_replacement() -> String {
    REDACTION_MARKER.to_string()
}

/// Settings for a flare run.
///
/// Passed explicitly to every collector; nothing reads global state.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FlareConfig {
    /// Main configuration file of the service, copied to `etc/`
    pub main_config_file: Option<PathBuf>,
    /// Service log file, used when the request does not name one
    pub log_file: Option<PathBuf>,
    /// Config search roots, used when the request does not name any
    pub conf_search_paths: SearchPaths,
    /// Upper bound for each collector, in seconds
    pub collector_timeout_secs: u64,
    /// Collectors whose failure aborts the run
    pub fatal_collectors: Vec<String>,
    /// Only environment variables with one of these prefixes are captured; empty means all
    pub env_prefixes: Vec<String>,
    pub redaction_rules: Vec<RedactionRule>,
    /// Enables the container collectors when a runtime is available
    pub container_collection: bool,
    pub config_extensions: Vec<String>,
    pub include_rotated_logs: bool,
    /// Command whose stdout is the status report
    pub status_command: Vec<String>,
    /// Command whose stdout is a JSON object of runtime metrics; empty disables `expvar/`
    pub metrics_command: Vec<String>,
}

impl Default for FlareConfig {
    fn default() -> Self {
        Self {
            main_config_file: None,
            log_file: None,
            conf_search_paths: SearchPaths::new(),
            collector_timeout_secs: DEFAULT_COLLECTOR_TIMEOUT_SECS,
            fatal_collectors: Vec::new(),
            env_prefixes: Vec::new(),
            redaction_rules: Vec::new(),
            container_collection: true,
            config_extensions: DEFAULT_CONFIG_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            include_rotated_logs: true,
            status_command: Vec::new(),
            metrics_command: Vec::new(),
        }
    }
}

impl FlareConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let mut config: FlareConfig = serde_yaml::from_str(&content)
            .context("Failed to parse YAML config")?;
        config.process_environment_variables();

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_yaml_file(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .context("Failed to serialize config to YAML")?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create {}", parent.display()))?;
            }
        }
        fs::write(path, yaml)
            .context(format!("Failed to write config to {}", path.display()))?;

        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Create a default configuration YAML file
    pub fn create_default_config_file(path: &Path) -> Result<()> {
        FlareConfig::default().save_to_yaml_file(path)
    }

    /// Expand environment variables in every configured path.
    ///
    /// Done once at load time so collectors never consult the environment
    /// for their inputs.
    pub fn process_environment_variables(&mut self) {
        fn expand(path: &Path) -> PathBuf {
            PathBuf::from(normalize_path_for_os(&expand_env_vars(&path.to_string_lossy())))
        }

        self.main_config_file = self.main_config_file.as_deref().map(expand);
        self.log_file = self.log_file.as_deref().map(expand);
        for root in self.conf_search_paths.values_mut() {
            *root = expand(root);
        }
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs.max(1))
    }

    /// Whether a failure of collector `name` aborts the run.
    pub fn is_fatal(&self, name: &str) -> bool {
        self.fatal_collectors.iter().any(|c| c == name)
    }

    /// Compile the configured redaction rules.
    ///
    /// Fails on the first invalid pattern, before any collection starts.
    pub fn build_scrubber(&self) -> crate::error::Result<Scrubber> {
        Scrubber::from_rules(
            self.redaction_rules
                .iter()
                .map(|r| (r.pattern.as_str(), r.replacement.as_str())),
        )
    }

    /// Whether `file_name` has one of the configured config extensions.
    pub fn is_config_file(&self, file_name: &str) -> bool {
        self.config_extensions
            .iter()
            .any(|ext| file_name.len() > ext.len() + 1 && file_name.ends_with(&format!(".{}", ext)))
    }
}

/// Load configuration from `config_path`, or fall back to defaults.
///
/// A path that is given but missing gets a default config written to it.
pub fn load_or_default(config_path: Option<&Path>) -> Result<FlareConfig> {
    match config_path {
        Some(path) if path.exists() => FlareConfig::from_yaml_file(path),
        Some(path) => {
            info!("Creating default config at {}", path.display());
            let config = FlareConfig::default();
            config.save_to_yaml_file(path)?;
            Ok(config)
        }
        None => {
            debug!("No config file given, using defaults");
            Ok(FlareConfig::default())
        }
    }
}
