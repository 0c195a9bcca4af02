//! Flare assembly: staging, collection and packaging.
//!
//! A run moves through a small state machine:
//!
//! ```text
//! Init -> Staging -> Collecting -> Packaging -> Done
//!            \            \             \
//!             +------------+-------------+--> Failed
//! ```
//!
//! `Collecting` only fails the run when a collector listed in
//! `fatal_collectors` fails or the run is cancelled. The staging directory
//! is removed before control returns, whatever the final state.

pub mod staging;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::collectors::{assemble_collectors, CollectContext, Collector, FlareSources};
use crate::config::FlareConfig;
use crate::constants::{
    COLLECTOR_DOCKER_INSPECT, COLLECTOR_DOCKER_PS, COLLECTOR_EXPVAR, SUMMARY_FILE_NAME, UNKNOWN_HOSTNAME,
};
use crate::error::{FlareError, Result};
use crate::models::{
    BundleRequest, CollectorFailure, CollectorReport, CollectorStatus, FileEntry, FlareOutcome,
};
use crate::security::{safe_error_message, sanitize_component, scrub_str, Scrubber};
use crate::utils::compress::create_archive;
use crate::utils::summary::{create_flare_summary, list_files};

pub use staging::StagingArea;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Init,
    Staging,
    Collecting,
    Packaging,
    Done,
    Failed,
}

impl AssemblyState {
    pub fn can_transition_to(self, next: AssemblyState) -> bool {
        use AssemblyState::*;
        matches!(
            (self, next),
            (Init, Staging)
                | (Staging, Collecting)
                | (Collecting, Packaging)
                | (Packaging, Done)
                | (Staging, Failed)
                | (Collecting, Failed)
                | (Packaging, Failed)
        )
    }
}

/// Tracks and logs the state of a single run.
#[derive(Debug)]
struct RunState {
    state: AssemblyState,
}

impl RunState {
    fn new() -> Self {
        Self { state: AssemblyState::Init }
    }

    fn advance(&mut self, next: AssemblyState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid flare state transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Flare assembly: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: FlareError) -> FlareError {
        self.advance(AssemblyState::Failed);
        error!("Flare creation failed: {}", err);
        err
    }
}

/// Outcome of one collector inside a run.
enum CollectorResult {
    Ok,
    Failed { reason: String, timed_out: bool },
}

/// Builds flare archives.
///
/// Holds the configuration, the compiled redaction rules and the data
/// sources. One builder can serve any number of runs, including concurrent
/// ones; each run gets its own staging area.
pub struct FlareBuilder {
    config: FlareConfig,
    sources: FlareSources,
    scrubber: Scrubber,
    staging_parent: PathBuf,
}

impl FlareBuilder {
    /// Fails with [`FlareError::RedactionConfig`] when a configured
    /// redaction rule does not compile.
    pub fn new(config: FlareConfig, sources: FlareSources) -> Result<Self> {
        let scrubber = config.build_scrubber()?;
        Ok(Self {
            config,
            sources,
            scrubber,
            staging_parent: env::temp_dir(),
        })
    }

    /// Directory under which staging areas are created (default: the system temp dir).
    pub fn staging_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_parent = dir.into();
        self
    }

    pub async fn create_flare(&self, request: &BundleRequest) -> Result<FlareOutcome> {
        self.create_flare_with_cancel(request, CancellationToken::new()).await
    }

    /// Build one flare archive at `request.archive_path`.
    ///
    /// Returns [`FlareError::Cancelled`] if `cancel` fires before the archive
    /// is in place. No file is left at the archive path on any error.
    pub async fn create_flare_with_cancel(
        &self,
        request: &BundleRequest,
        cancel: CancellationToken,
    ) -> Result<FlareOutcome> {
        let started = Instant::now();
        let mut run = RunState::new();
        let hostname = self.resolve_hostname();
        info!("Creating flare for {} at {}", hostname, request.archive_path.display());

        run.advance(AssemblyState::Staging);
        let staging = match StagingArea::create(&self.staging_parent, &hostname) {
            Ok(staging) => staging,
            Err(e) => {
                let reason = safe_error_message(&self.staging_parent.display().to_string(), &e);
                return Err(run.fail(FlareError::Setup(reason)));
            }
        };

        run.advance(AssemblyState::Collecting);
        let collectors = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Flare cancelled while assembling collectors");
                return Err(run.fail(FlareError::Cancelled));
            }
            collectors = assemble_collectors(&self.sources, &self.config) => collectors,
        };
        let (mut reports, degraded) = self
            .collect_all(&collectors, staging.host_root(), &hostname, request, &cancel)
            .await
            .map_err(|e| run.fail(e))?;
        reports.extend(self.skipped_reports(&collectors));

        let files = self.write_summary(&staging, &hostname, request.local, &reports).await;

        if cancel.is_cancelled() {
            return Err(run.fail(FlareError::Cancelled));
        }

        run.advance(AssemblyState::Packaging);
        let source = staging.host_root().to_path_buf();
        let target = request.archive_path.clone();
        let prefix = hostname.clone();
        let token = cancel.clone();
        let packaged = tokio::task::spawn_blocking(move || {
            create_archive(&source, &prefix, &target, Some(&token))
        })
        .await;

        match packaged {
            Ok(Ok(count)) => debug!("Packaged {} files", count),
            Ok(Err(_)) if cancel.is_cancelled() => return Err(run.fail(FlareError::Cancelled)),
            Ok(Err(e)) => {
                return Err(run.fail(FlareError::Packaging(scrub_str(&format!("{:#}", e)))));
            }
            Err(e) => {
                let reason = format!("packaging task failed: {}", e);
                return Err(run.fail(FlareError::Packaging(reason)));
            }
        }

        if let Err(e) = staging.close() {
            warn!("Failed to remove staging area: {}", e);
        }
        run.advance(AssemblyState::Done);
        info!(
            "Flare created at {} in {:?} ({} degraded collector(s))",
            request.archive_path.display(),
            started.elapsed(),
            degraded.len()
        );

        Ok(FlareOutcome {
            archive_path: request.archive_path.clone(),
            hostname,
            degraded,
            files,
        })
    }

    /// Run every collector, then wait for the blocking work they spawned.
    ///
    /// Nothing writes to the staging area once this returns, whatever the
    /// result.
    async fn collect_all(
        &self,
        collectors: &[Box<dyn Collector>],
        root: &Path,
        hostname: &str,
        request: &BundleRequest,
        cancel: &CancellationToken,
    ) -> Result<(Vec<CollectorReport>, Vec<CollectorFailure>)> {
        let tasks = TaskTracker::new();
        let collected = self
            .run_collectors(collectors, root, hostname, request, cancel, &tasks)
            .await;

        tasks.close();
        if !tasks.is_empty() {
            debug!("Waiting for {} blocking task(s) to stop", tasks.len());
        }
        tasks.wait().await;
        collected
    }

    async fn run_collectors(
        &self,
        collectors: &[Box<dyn Collector>],
        root: &Path,
        hostname: &str,
        request: &BundleRequest,
        cancel: &CancellationToken,
        tasks: &TaskTracker,
    ) -> Result<(Vec<CollectorReport>, Vec<CollectorFailure>)> {
        let mut reports = Vec::with_capacity(collectors.len() + 3);
        let mut degraded = Vec::new();

        for collector in collectors {
            let name = collector.name();
            let stop = cancel.child_token();
            let ctx = CollectContext {
                root,
                hostname,
                request,
                config: &self.config,
                scrubber: &self.scrubber,
                stop: &stop,
                tasks,
            };

            let collector_started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Flare cancelled while running collector '{}'", name);
                    return Err(FlareError::Cancelled);
                }
                result = self.run_collector(collector.as_ref(), &ctx) => result,
            };
            // Whatever the collector left running on the blocking pool ends with its slot
            stop.cancel();
            let duration_ms = collector_started.elapsed().as_millis() as u64;

            match result {
                CollectorResult::Ok => {
                    debug!("Collector '{}' finished in {}ms", name, duration_ms);
                    reports.push(CollectorReport {
                        name: name.to_string(),
                        status: CollectorStatus::Ok,
                        reason: None,
                        duration_ms,
                    });
                }
                CollectorResult::Failed { reason, timed_out } => {
                    if self.config.is_fatal(name) {
                        return Err(FlareError::FatalCollection {
                            collector: name.to_string(),
                            reason,
                        });
                    }
                    let failure = CollectorFailure {
                        collector: name.to_string(),
                        reason,
                        timed_out,
                    };
                    warn!("{}", failure.as_error());
                    reports.push(CollectorReport {
                        name: name.to_string(),
                        status: CollectorStatus::Degraded,
                        reason: Some(failure.reason.clone()),
                        duration_ms,
                    });
                    degraded.push(failure);
                }
            }
        }
        Ok((reports, degraded))
    }

    /// Host identity used as the archive root; never fails.
    fn resolve_hostname(&self) -> String {
        match self.sources.hostname.hostname() {
            Ok(name) => {
                let name = sanitize_component(&name);
                if name.is_empty() {
                    warn!("Hostname is empty, using '{}'", UNKNOWN_HOSTNAME);
                    UNKNOWN_HOSTNAME.to_string()
                } else {
                    name
                }
            }
            Err(e) => {
                warn!("{}, using '{}'", safe_error_message("Hostname lookup failed", &e), UNKNOWN_HOSTNAME);
                UNKNOWN_HOSTNAME.to_string()
            }
        }
    }

    async fn run_collector(&self, collector: &dyn Collector, ctx: &CollectContext<'_>) -> CollectorResult {
        let timeout = self.config.collector_timeout();
        match tokio::time::timeout(timeout, collector.collect(ctx)).await {
            Ok(Ok(())) => CollectorResult::Ok,
            Ok(Err(e)) => CollectorResult::Failed {
                reason: scrub_str(&format!("{:#}", e)),
                timed_out: false,
            },
            Err(_) => CollectorResult::Failed {
                reason: format!("timed out after {}s", timeout.as_secs()),
                timed_out: true,
            },
        }
    }

    /// Reports for the optional collectors that were left out of this run.
    fn skipped_reports(&self, collectors: &[Box<dyn Collector>]) -> Vec<CollectorReport> {
        let container_reason = if self.config.container_collection {
            "no container runtime available"
        } else {
            "container collection disabled"
        };
        let optional = [
            (COLLECTOR_EXPVAR, "no metrics source configured"),
            (COLLECTOR_DOCKER_INSPECT, container_reason),
            (COLLECTOR_DOCKER_PS, container_reason),
        ];
        optional
            .iter()
            .filter(|(name, _)| !collectors.iter().any(|c| c.name() == *name))
            .map(|(name, reason)| CollectorReport {
                name: name.to_string(),
                status: CollectorStatus::Skipped,
                reason: Some(reason.to_string()),
                duration_ms: 0,
            })
            .collect()
    }

    /// Write `flare_summary.json` and return the file listing.
    ///
    /// A failure here is logged and does not fail the run.
    async fn write_summary(
        &self,
        staging: &StagingArea,
        hostname: &str,
        local: bool,
        reports: &[CollectorReport],
    ) -> Vec<FileEntry> {
        let root = staging.host_root().to_path_buf();
        let hostname = hostname.to_string();
        let reports = reports.to_vec();

        let written = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<FileEntry>> {
            let files = list_files(&root)?;
            let summary = create_flare_summary(&hostname, local, &reports, &files)?;
            fs::write(root.join(SUMMARY_FILE_NAME), summary)?;
            Ok(files)
        })
        .await;

        match written {
            Ok(Ok(files)) => files,
            Ok(Err(e)) => {
                warn!("{}", safe_error_message("Failed to write flare summary", &format!("{:#}", e)));
                Vec::new()
            }
            Err(e) => {
                warn!("Flare summary task failed: {}", e);
                Vec::new()
            }
        }
    }
}
