//! Configuration files: the main config plus every search root.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::collectors::collector::{CollectContext, Collector};
use crate::config::FlareConfig;
use crate::constants::{COLLECTOR_CONFIG, CONFD_DIR_NAME, ETC_DIR_NAME};
use crate::models::SearchPaths;
use crate::security::credential_scrubber::{is_sensitive_path, scrub_path, Scrubber};
use crate::security::path_validator::{confined_path, sanitize_component};
use crate::security::redacting_writer::copy_redacted;

/// Mirrors configuration under `etc/` and `etc/confd/<label>/`.
pub struct ConfigFilesCollector;

/// What to copy, resolved up front so the copying can run off the async runtime.
struct ConfigPlan {
    root: PathBuf,
    main_config: Option<PathBuf>,
    search_paths: SearchPaths,
    config: FlareConfig,
    scrubber: Scrubber,
    stop: CancellationToken,
}

#[derive(Debug, Default)]
struct CopyStats {
    copied: usize,
    skipped: usize,
    readable_sources: usize,
    configured_sources: usize,
}

#[async_trait::async_trait]
impl Collector for ConfigFilesCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_CONFIG
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        let plan = ConfigPlan {
            root: ctx.root.to_path_buf(),
            main_config: ctx.config.main_config_file.clone(),
            search_paths: ctx.request.conf_search_paths.clone(),
            config: ctx.config.clone(),
            scrubber: ctx.scrubber.clone(),
            stop: ctx.stop.clone(),
        };

        let stats = ctx
            .spawn_blocking(move || plan.run())
            .await
            .context("Config copy task failed")??;

        if stats.configured_sources > 0 && stats.readable_sources == 0 {
            bail!("None of the {} configured config locations could be read", stats.configured_sources);
        }
        info!("Collected {} config file(s), skipped {}", stats.copied, stats.skipped);
        Ok(())
    }
}

impl ConfigPlan {
    fn check_stop(&self) -> Result<()> {
        if self.stop.is_cancelled() {
            bail!("Config copy stopped");
        }
        Ok(())
    }

    fn run(&self) -> Result<CopyStats> {
        let mut stats = CopyStats::default();

        if let Some(main) = &self.main_config {
            self.check_stop()?;
            stats.configured_sources += 1;
            match self.copy_main(main) {
                Ok(()) => {
                    stats.readable_sources += 1;
                    stats.copied += 1;
                }
                Err(e) => warn!("Failed to collect main config {}: {:#}", main.display(), e),
            }
        }

        for (label, root) in &self.search_paths {
            self.check_stop()?;
            stats.configured_sources += 1;
            if !root.is_dir() {
                warn!("Config search path [{}] {} does not exist", label, root.display());
                continue;
            }
            stats.readable_sources += 1;
            self.copy_tree(label, root, &mut stats)?;
        }

        Ok(stats)
    }

    fn copy_main(&self, main: &Path) -> Result<()> {
        let name = main
            .file_name()
            .context("Main config path has no file name")?;
        let dest = confined_path(&self.root, &Path::new(ETC_DIR_NAME).join(name))?;
        copy_redacted(main, &dest, &self.scrubber, Some(&self.stop))?;
        Ok(())
    }

    fn copy_tree(&self, label: &str, root: &Path, stats: &mut CopyStats) -> Result<()> {
        let mut dest_base = Path::new(ETC_DIR_NAME).join(CONFD_DIR_NAME);
        let label = sanitize_component(label);
        if !label.is_empty() {
            dest_base.push(label);
        }

        for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
            self.check_stop()?;
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Error walking {}: {}", root.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy();
            if !self.config.is_config_file(&file_name) {
                continue;
            }
            if is_sensitive_path(&path.to_string_lossy()) {
                debug!("Skipping sensitive file {}", scrub_path(&path.to_string_lossy()));
                stats.skipped += 1;
                continue;
            }

            let relative = match path.strip_prefix(root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            let dest = confined_path(&self.root, &dest_base.join(relative))?;
            match copy_redacted(path, &dest, &self.scrubber, Some(&self.stop)) {
                Ok(_) => stats.copied += 1,
                Err(e) => {
                    warn!("Failed to copy {}: {}", path.display(), e);
                    stats.skipped += 1;
                }
            }
        }
        Ok(())
    }
}
