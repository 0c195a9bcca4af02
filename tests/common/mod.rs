//! Shared fixtures for the integration tests.
//!
//! The provider mocks in the library only exist for its unit tests, so the
//! integration tests use these small hand-written fakes instead.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tempfile::TempDir;
use zip::ZipArchive;

use rs_flare::collectors::providers::{
    ConfigChecker, ContainerRuntime, ContainerSummary, HostnameResolver, MetricsProvider,
    StatusProvider,
};
use rs_flare::collectors::FlareSources;
use rs_flare::config::FlareConfig;
use rs_flare::models::SearchPaths;
use rs_flare::{BundleRequest, FlareBuilder};

pub const HOST: &str = "web-01";

/// Status provider with a canned answer that counts its calls.
#[derive(Default)]
pub struct FakeStatus {
    pub report: Option<String>,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeStatus {
    pub fn returning(report: &str) -> Arc<Self> {
        Arc::new(Self {
            report: Some(report.to_string()),
            ..Self::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            report: Some("late".to_string()),
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProvider for FakeStatus {
    async fn fetch_status(&self) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.report
            .as_ref()
            .map(|r| r.as_bytes().to_vec())
            .ok_or_else(|| anyhow!("status endpoint unreachable"))
    }
}

/// Metrics source with a canned JSON document.
pub struct FakeMetrics(pub Option<serde_json::Value>);

#[async_trait]
impl MetricsProvider for FakeMetrics {
    async fn fetch_metrics(&self) -> Result<serde_json::Value> {
        self.0.clone().ok_or_else(|| anyhow!("metrics endpoint unreachable"))
    }
}

/// Container runtime backed by fixed data; `None` means "not in a container".
#[derive(Default)]
pub struct FakeRuntime {
    pub inspect: Option<serde_json::Value>,
    pub images: HashMap<String, String>,
    pub containers: Vec<ContainerSummary>,
    /// Capability check that never answers
    pub hang: bool,
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn is_available(&self) -> bool {
        if self.hang {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.inspect.is_some()
    }

    async fn inspect_self(&self) -> Result<serde_json::Value> {
        self.inspect.clone().ok_or_else(|| anyhow!("not in a container"))
    }

    async fn resolve_image_digest(&self, digest: &str) -> Result<String> {
        self.images
            .get(digest)
            .cloned()
            .ok_or_else(|| anyhow!("unknown image {}", digest))
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self.containers.clone())
    }
}

pub struct FakeHostname(pub Option<String>);

impl HostnameResolver for FakeHostname {
    fn hostname(&self) -> Result<String> {
        self.0.clone().ok_or_else(|| anyhow!("no hostname"))
    }
}

pub struct FakeChecker;

#[async_trait]
impl ConfigChecker for FakeChecker {
    async fn check(&self, _main: Option<&Path>, search_paths: &SearchPaths) -> Result<String> {
        Ok(format!("{} search path(s) checked\n", search_paths.len()))
    }
}

pub fn sources(status: Arc<FakeStatus>) -> FlareSources {
    FlareSources {
        status,
        runtime: Arc::new(FakeRuntime::default()),
        hostname: Arc::new(FakeHostname(Some(HOST.to_string()))),
        config_checker: Arc::new(FakeChecker),
        metrics: None,
        env: vec![
            ("SVC_SITE".to_string(), "example.com".to_string()),
            ("SVC_API_KEY".to_string(), "0123456789abcdef".to_string()),
        ],
    }
}

/// Temp directories for sources, staging and output of one test.
pub struct Workspace {
    pub sources: TempDir,
    pub staging: TempDir,
    pub out: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            sources: TempDir::new()?,
            staging: TempDir::new()?,
            out: TempDir::new()?,
        })
    }

    pub fn builder(&self, config: FlareConfig, sources: FlareSources) -> Result<FlareBuilder> {
        Ok(FlareBuilder::new(config, sources)?.staging_parent(self.staging.path()))
    }

    pub fn archive_path(&self, name: &str) -> PathBuf {
        self.out.path().join(name)
    }

    pub fn request(&self) -> BundleRequest {
        BundleRequest::new(self.archive_path("flare.zip"))
    }

    /// Write a source file, creating its parent directories.
    pub fn write_source(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let path = self.sources.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    pub fn staging_is_empty(&self) -> Result<bool> {
        Ok(fs::read_dir(self.staging.path())?.next().is_none())
    }

    pub fn output_is_empty(&self) -> Result<bool> {
        Ok(fs::read_dir(self.out.path())?.next().is_none())
    }
}

pub fn entry_names(archive: &Path) -> Result<Vec<String>> {
    let zip = ZipArchive::new(fs::File::open(archive)?)?;
    Ok(zip.file_names().map(str::to_string).collect())
}

pub fn read_entry(archive: &Path, name: &str) -> Result<String> {
    let mut zip = ZipArchive::new(fs::File::open(archive)?)?;
    let mut content = String::new();
    zip.by_name(name)?.read_to_string(&mut content)?;
    Ok(content)
}
