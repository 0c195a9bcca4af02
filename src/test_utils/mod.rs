//! Test utilities for rs-flare
//!
//! Shared fixtures for collector and assembler unit tests: a throwaway
//! staging layout and simple in-memory collaborators.

#![cfg(test)]

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::collectors::CollectContext;
use crate::config::FlareConfig;
use crate::models::BundleRequest;
use crate::security::Scrubber;

pub const TEST_HOSTNAME: &str = "test-host";

/// A temp directory holding a staging root plus room for fake source files.
///
/// ```text
/// <tmp>/base/...            sources created with `source_dir`
/// <tmp>/staging/test-host/  collector output root
/// ```
pub struct TestStage {
    pub request: BundleRequest,
    pub config: FlareConfig,
    pub scrubber: Scrubber,
    /// Stop token handed to collectors; cancel it to simulate a timeout
    pub stop: CancellationToken,
    tasks: TaskTracker,
    root: PathBuf,
    base: PathBuf,
    _dir: TempDir,
}

impl TestStage {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let base = dir.path().join("base");
        let root = dir.path().join("staging").join(TEST_HOSTNAME);
        fs::create_dir_all(&base)?;
        fs::create_dir_all(&root)?;

        Ok(Self {
            request: BundleRequest::new(dir.path().join("flare.zip")),
            config: FlareConfig::default(),
            scrubber: Scrubber::new(),
            stop: CancellationToken::new(),
            tasks: TaskTracker::new(),
            root,
            base,
            _dir: dir,
        })
    }

    pub fn ctx(&self) -> CollectContext<'_> {
        CollectContext {
            root: &self.root,
            hostname: TEST_HOSTNAME,
            request: &self.request,
            config: &self.config,
            scrubber: &self.scrubber,
            stop: &self.stop,
            tasks: &self.tasks,
        }
    }

    /// Collector output root (`<staging>/<hostname>`).
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for fake source files, outside the staging area.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Create a source directory under [`base`](Self::base).
    pub fn source_dir(&self, relative: &str) -> Result<PathBuf> {
        let dir = self.base.join(relative);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// In-memory collaborators that need no mock expectations.
pub mod fakes {
    use std::path::Path;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use crate::collectors::providers::{ConfigChecker, HostnameResolver};
    use crate::models::SearchPaths;

    /// Hostname resolver returning a fixed name, or failing.
    pub struct FixedHostname(Option<String>);

    impl FixedHostname {
        pub fn new(name: &str) -> Self {
            Self(Some(name.to_string()))
        }

        pub fn failing() -> Self {
            Self(None)
        }
    }

    impl HostnameResolver for FixedHostname {
        fn hostname(&self) -> Result<String> {
            self.0.clone().ok_or_else(|| anyhow!("hostname lookup failed"))
        }
    }

    /// Config checker returning a canned report.
    pub struct StaticChecker(std::result::Result<String, String>);

    impl StaticChecker {
        pub fn new(report: &str) -> Self {
            Self(Ok(report.to_string()))
        }

        pub fn failing(message: &str) -> Self {
            Self(Err(message.to_string()))
        }
    }

    #[async_trait]
    impl ConfigChecker for StaticChecker {
        async fn check(&self, _main: Option<&Path>, _search: &SearchPaths) -> Result<String> {
            self.0.clone().map_err(|e| anyhow!(e))
        }
    }
}
