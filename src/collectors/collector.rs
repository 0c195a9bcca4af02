use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::collectors::config_check::ConfigCheckCollector;
use crate::collectors::config_files::ConfigFilesCollector;
use crate::collectors::docker::{DockerInspectCollector, DockerPsCollector};
use crate::collectors::envvars::EnvVarsCollector;
use crate::collectors::expvar::ExpvarCollector;
use crate::collectors::logs::LogsCollector;
use crate::collectors::providers::FlareSources;
use crate::collectors::status::StatusCollector;
use crate::config::FlareConfig;
use crate::models::BundleRequest;
use crate::security::path_validator::confined_path;
use crate::security::redacting_writer::RedactingWriter;
use crate::security::credential_scrubber::Scrubber;

/// Everything a collector may look at while it runs.
pub struct CollectContext<'a> {
    /// `<staging>/<hostname>`; every output entry lives below it
    pub root: &'a Path,
    pub hostname: &'a str,
    pub request: &'a BundleRequest,
    pub config: &'a FlareConfig,
    /// Built-in rules plus the configured redaction rules
    pub scrubber: &'a Scrubber,
    /// Fires when this collector times out or the run is cancelled.
    /// Blocking work must check it between files and chunks.
    pub stop: &'a CancellationToken,
    /// Blocking work of the run; waited for before staging is removed
    pub tasks: &'a TaskTracker,
}

impl<'a> CollectContext<'a> {
    /// Absolute path of an output entry, confined to the staging root.
    pub fn entry_path(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        confined_path(self.root, relative.as_ref())
    }

    /// Open a redacting writer for an output entry.
    pub fn writer(&self, relative: impl AsRef<Path>) -> Result<RedactingWriter> {
        let path = self.entry_path(relative)?;
        Ok(RedactingWriter::create_with(&path, self.scrubber)?)
    }

    /// Run `f` on the blocking pool, tracked by the run.
    ///
    /// Dropping the returned handle does not stop `f`; it has to watch
    /// [`stop`](Self::stop) itself.
    pub fn spawn_blocking<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.tasks.spawn_blocking(f)
    }
}

/// Trait for flare collectors
///
/// A collector gathers one class of artifact and writes it below
/// [`CollectContext::root`] through a [`RedactingWriter`].
#[async_trait::async_trait]
pub trait Collector: Send + Sync {
    /// Stable identifier, used in logs, the summary and `fatal_collectors`.
    fn name(&self) -> &'static str;

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()>;
}

/// Build the collector set for one run, in collection order.
///
/// The metrics collector is only included when a metrics source is
/// configured. The container collectors are only included when container
/// collection is enabled and the runtime reports itself available within the
/// collector timeout.
pub async fn assemble_collectors(sources: &FlareSources, config: &FlareConfig) -> Vec<Box<dyn Collector>> {
    let mut collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(StatusCollector::new(sources.status.clone())),
        Box::new(LogsCollector),
        Box::new(ConfigFilesCollector),
    ];

    match &sources.metrics {
        Some(metrics) => collectors.push(Box::new(ExpvarCollector::new(metrics.clone()))),
        None => debug!("No metrics source configured"),
    }

    collectors.push(Box::new(EnvVarsCollector::new(sources.env.clone())));
    collectors.push(Box::new(ConfigCheckCollector::new(sources.config_checker.clone())));

    if !config.container_collection {
        debug!("Container collection disabled by configuration");
    } else if runtime_available(sources, config).await {
        info!("Container runtime detected, adding container collectors");
        collectors.push(Box::new(DockerInspectCollector::new(sources.runtime.clone())));
        collectors.push(Box::new(DockerPsCollector::new(sources.runtime.clone())));
    }

    collectors
}

/// Capability check bounded by the collector timeout; a check that does not
/// answer in time counts as unavailable.
async fn runtime_available(sources: &FlareSources, config: &FlareConfig) -> bool {
    let timeout = config.collector_timeout();
    match tokio::time::timeout(timeout, sources.runtime.is_available()).await {
        Ok(available) => available,
        Err(_) => {
            warn!(
                "Container runtime check timed out after {}s, skipping container collectors",
                timeout.as_secs()
            );
            false
        }
    }
}
