//! External data sources consumed by the collectors.
//!
//! Each source sits behind a trait so the assembler can run against fakes in
//! tests and against the real system in the binary. The defaults here shell
//! out to whatever the host provides (status and metrics commands, the
//! `docker` CLI).

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use cached::proc_macro::once;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use walkdir::WalkDir;

use crate::config::FlareConfig;
use crate::constants::HOSTNAME_CACHE_SECS;
use crate::models::SearchPaths;

/// Produces the formatted status report of the running service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn fetch_status(&self) -> Result<Vec<u8>>;
}

/// Produces the runtime metrics of the running service as a JSON object,
/// one top-level key per metric group.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn fetch_metrics(&self) -> Result<serde_json::Value>;
}

/// One row of the container listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Command", default)]
    pub command: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Ports", default)]
    pub ports: String,
    #[serde(rename = "Names", default)]
    pub names: String,
}

/// Access to the container runtime this process runs under.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime capability check, done once when the collector set is built.
    async fn is_available(&self) -> bool;

    /// Inspection data of the container running this process.
    async fn inspect_self(&self) -> Result<serde_json::Value>;

    /// Map an image digest (`sha256:...`) to a human readable `name:tag`.
    async fn resolve_image_digest(&self, digest: &str) -> Result<String>;

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>>;
}

/// Resolves the host identity used as the archive root.
pub trait HostnameResolver: Send + Sync {
    fn hostname(&self) -> Result<String>;
}

/// Runs a configuration self-check and returns its textual report.
#[async_trait]
pub trait ConfigChecker: Send + Sync {
    async fn check(&self, main_config: Option<&Path>, search_paths: &SearchPaths) -> Result<String>;
}

/// The set of sources a flare run draws from.
#[derive(Clone)]
pub struct FlareSources {
    pub status: Arc<dyn StatusProvider>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub hostname: Arc<dyn HostnameResolver>,
    pub config_checker: Arc<dyn ConfigChecker>,
    /// Metrics source; the expvar collector only runs when one is set
    pub metrics: Option<Arc<dyn MetricsProvider>>,
    /// Environment snapshot captured by the envvars collector
    pub env: Vec<(String, String)>,
}

impl FlareSources {
    /// Sources backed by the local system.
    pub fn system(config: &FlareConfig) -> Self {
        let metrics: Option<Arc<dyn MetricsProvider>> = if config.metrics_command.is_empty() {
            None
        } else {
            Some(Arc::new(CommandMetricsProvider::new(config.metrics_command.clone())))
        };

        Self {
            status: Arc::new(CommandStatusProvider::new(config.status_command.clone())),
            runtime: Arc::new(DockerCliRuntime::default()),
            hostname: Arc::new(SystemHostname),
            config_checker: Arc::new(YamlConfigChecker),
            metrics,
            env: lossy_env(std::env::vars_os()),
        }
    }
}

/// Environment snapshot as strings; names or values that are not valid
/// UTF-8 are converted lossily instead of being dropped.
pub fn lossy_env<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .map(|(name, value)| {
            (name.to_string_lossy().into_owned(), value.to_string_lossy().into_owned())
        })
        .collect()
}

/// Hostname from the operating system, cached for a few minutes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHostname;

#[once(time = 300, result = true, sync_writes = true)]
fn cached_hostname() -> std::result::Result<String, String> {
    let name = hostname::get().map_err(|e| e.to_string())?;
    name.into_string()
        .map_err(|raw| format!("hostname is not valid UTF-8: {:?}", raw))
}

impl HostnameResolver for SystemHostname {
    fn hostname(&self) -> Result<String> {
        debug!("Resolving hostname (cached for {}s)", HOSTNAME_CACHE_SECS);
        cached_hostname().map_err(|e| anyhow!("Failed to resolve hostname: {}", e))
    }
}

/// Status report taken from the stdout of a configured command.
#[derive(Debug, Clone)]
pub struct CommandStatusProvider {
    command: Vec<String>,
}

impl CommandStatusProvider {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl StatusProvider for CommandStatusProvider {
    async fn fetch_status(&self) -> Result<Vec<u8>> {
        run_command(&self.command, "status").await
    }
}

/// Metrics parsed from the JSON stdout of a configured command.
#[derive(Debug, Clone)]
pub struct CommandMetricsProvider {
    command: Vec<String>,
}

impl CommandMetricsProvider {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl MetricsProvider for CommandMetricsProvider {
    async fn fetch_metrics(&self) -> Result<serde_json::Value> {
        let stdout = run_command(&self.command, "metrics").await?;
        serde_json::from_slice(&stdout).context("Metrics command did not print valid JSON")
    }
}

/// Run `command` and return its stdout; `what` names it in errors.
///
/// The child is killed if the returned future is dropped.
async fn run_command(command: &[String], what: &str) -> Result<Vec<u8>> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow!("No {} command configured", what))?;

    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .context(format!("Failed to run {} command '{}'", what, program))?;

    if !output.status.success() {
        bail!(
            "{} command '{}' exited with {}: {}",
            what,
            program,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(output.stdout)
}

/// Container runtime driven through the `docker` CLI.
#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    binary: PathBuf,
}

impl Default for DockerCliRuntime {
    fn default() -> Self {
        Self { binary: PathBuf::from("docker") }
    }
}

impl DockerCliRuntime {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .context(format!("Failed to run {} {}", self.binary.display(), args.join(" ")))?;

        if !output.status.success() {
            bail!(
                "{} {} failed: {}",
                self.binary.display(),
                args.first().unwrap_or(&""),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Id of the container this process runs in, from the cgroup table or
    /// the container hostname.
    fn self_container_id() -> Result<String> {
        if let Ok(cgroup) = fs::read_to_string("/proc/self/cgroup") {
            if let Some(id) = container_id_from_cgroup(&cgroup) {
                return Ok(id);
            }
        }
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .context("Failed to determine own container id")
    }
}

/// Extract a 64 character container id from `/proc/self/cgroup` content.
pub(crate) fn container_id_from_cgroup(cgroup: &str) -> Option<String> {
    cgroup.lines().find_map(|line| {
        line.rsplit(|c: char| c == '/' || c == '-' || c == ':')
            .map(|part| part.trim_end_matches(".scope"))
            .find(|part| part.len() == 64 && part.chars().all(|c| c.is_ascii_hexdigit()))
            .map(str::to_string)
    })
}

fn running_in_container() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }
    fs::read_to_string("/proc/self/cgroup")
        .map(|cgroup| ["docker", "containerd", "kubepods"].iter().any(|k| cgroup.contains(k)))
        .unwrap_or(false)
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn is_available(&self) -> bool {
        if !running_in_container() {
            debug!("Not running in a container, skipping container collectors");
            return false;
        }
        match self.run(&["version", "--format", "{{.Server.Version}}"]).await {
            Ok(version) => {
                debug!("Container runtime available: docker {}", version.trim());
                true
            }
            Err(e) => {
                warn!("Container runtime not reachable: {}", e);
                false
            }
        }
    }

    async fn inspect_self(&self) -> Result<serde_json::Value> {
        let id = Self::self_container_id()?;
        let raw = self.run(&["inspect", &id]).await?;
        let mut parsed: Vec<serde_json::Value> =
            serde_json::from_str(&raw).context("Failed to parse docker inspect output")?;
        if parsed.is_empty() {
            bail!("docker inspect returned no data for {}", id);
        }
        Ok(parsed.swap_remove(0))
    }

    async fn resolve_image_digest(&self, digest: &str) -> Result<String> {
        let raw = self
            .run(&["image", "inspect", "--format", "{{join .RepoTags \",\"}}", digest])
            .await?;
        raw.trim()
            .split(',')
            .map(str::trim)
            .find(|tag| !tag.is_empty())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Image {} has no tags", digest))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let raw = self.run(&["ps", "--all", "--no-trunc", "--format", "{{json .}}"]).await?;
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).context("Failed to parse docker ps row"))
            .collect()
    }
}

/// Checks that every YAML configuration file parses.
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlConfigChecker;

impl YamlConfigChecker {
    fn check_file(path: &Path, report: &mut String) -> bool {
        let result = fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|content| {
                serde_yaml::from_str::<serde_yaml::Value>(&content)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            });
        match result {
            Ok(()) => {
                report.push_str(&format!("OK     {}\n", path.display()));
                true
            }
            Err(e) => {
                report.push_str(&format!("ERROR  {}: {}\n", path.display(), e));
                false
            }
        }
    }

    fn check_all(main_config: Option<&Path>, search_paths: &SearchPaths) -> String {
        let mut report = String::from("=== Configuration check ===\n");
        let (mut ok, mut failed) = (0usize, 0usize);
        let mut tally = |passed: bool| if passed { ok += 1 } else { failed += 1 };

        if let Some(main) = main_config {
            tally(Self::check_file(main, &mut report));
        }

        for (label, root) in search_paths {
            if !root.is_dir() {
                report.push_str(&format!("SKIP   [{}] {} (not a directory)\n", label, root.display()));
                continue;
            }
            for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
                let is_yaml = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .map_or(false, |e| e == "yaml" || e == "yml");
                if entry.file_type().is_file() && is_yaml {
                    tally(Self::check_file(entry.path(), &mut report));
                }
            }
        }

        report.push_str(&format!("\n{} file(s) checked, {} valid, {} invalid\n", ok + failed, ok, failed));
        report
    }
}

#[async_trait]
impl ConfigChecker for YamlConfigChecker {
    async fn check(&self, main_config: Option<&Path>, search_paths: &SearchPaths) -> Result<String> {
        let main_config = main_config.map(Path::to_path_buf);
        let search_paths = search_paths.clone();
        tokio::task::spawn_blocking(move || Self::check_all(main_config.as_deref(), &search_paths))
            .await
            .context("Config check task failed")
    }
}
