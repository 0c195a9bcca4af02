use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::FlareError;

/// Label to root directory mapping searched by the config collector.
///
/// The empty label maps straight to `etc/confd/` in the archive.
pub type SearchPaths = BTreeMap<String, PathBuf>;

/// Everything a single flare run needs from its caller.
///
/// Immutable for the duration of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRequest {
    pub archive_path: PathBuf,
    pub local: bool,
    pub log_file_path: Option<PathBuf>,
    #[serde(default)]
    pub conf_search_paths: SearchPaths,
}

impl BundleRequest {
    pub fn new(archive_path: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: archive_path.into(),
            local: false,
            log_file_path: None,
            conf_search_paths: SearchPaths::new(),
        }
    }

    pub fn local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file_path = Some(path.into());
        self
    }

    pub fn search_path(mut self, label: &str, root: impl Into<PathBuf>) -> Self {
        self.conf_search_paths.insert(label.to_string(), root.into());
        self
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }
}

/// How a collector ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorStatus {
    Ok,
    Degraded,
    Skipped,
}

/// Per-collector entry recorded in the flare summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorReport {
    pub name: String,
    pub status: CollectorStatus,
    pub reason: Option<String>,
    pub duration_ms: u64,
}

/// A collector that failed without stopping the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorFailure {
    pub collector: String,
    pub reason: String,
    pub timed_out: bool,
}

impl CollectorFailure {
    /// The failure as a [`FlareError::DegradedCollection`].
    pub fn as_error(&self) -> FlareError {
        FlareError::DegradedCollection {
            collector: self.collector.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// A file included in the archive, as listed in the summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub sha256: Option<String>,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct FlareOutcome {
    pub archive_path: PathBuf,
    pub hostname: String,
    pub degraded: Vec<CollectorFailure>,
    pub files: Vec<FileEntry>,
}

impl FlareOutcome {
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}
