//! Service log files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::collectors::collector::{CollectContext, Collector};
use crate::constants::{COLLECTOR_LOGS, COMPRESSED_EXTENSIONS, LOGS_DIR_NAME};
use crate::security::credential_scrubber::Scrubber;
use crate::security::redacting_writer::copy_redacted;

/// Copies the service log, and its rotated siblings, into `logs/`.
pub struct LogsCollector;

#[async_trait::async_trait]
impl Collector for LogsCollector {
    fn name(&self) -> &'static str {
        COLLECTOR_LOGS
    }

    async fn collect(&self, ctx: &CollectContext<'_>) -> Result<()> {
        let log_file = match &ctx.request.log_file_path {
            Some(path) => path.clone(),
            None => {
                debug!("No log file configured, skipping logs");
                return Ok(());
            }
        };

        let files = find_log_files(&log_file, ctx.config.include_rotated_logs)?;
        let dest_dir = ctx.entry_path(LOGS_DIR_NAME)?;
        let scrubber = ctx.scrubber.clone();
        let stop = ctx.stop.clone();

        let (count, bytes) = ctx
            .spawn_blocking(move || copy_logs(&files, &dest_dir, &scrubber, &stop))
            .await
            .context("Log copy task failed")??;

        info!("Collected {} log file(s), {} bytes", count, bytes);
        Ok(())
    }
}

/// The main log file followed by its rotated siblings (`svc.log.1`, ...).
///
/// Compressed rotations are skipped; they cannot be scrubbed.
fn find_log_files(log_file: &Path, include_rotated: bool) -> Result<Vec<PathBuf>> {
    if !log_file.is_file() {
        bail!("Log file {} not found", log_file.display());
    }

    let mut files = vec![log_file.to_path_buf()];
    if !include_rotated {
        return Ok(files);
    }

    let (parent, name) = match (log_file.parent(), log_file.file_name().and_then(|n| n.to_str())) {
        (Some(parent), Some(name)) if parent.as_os_str().is_empty() => (Path::new("."), name),
        (Some(parent), Some(name)) => (parent, name),
        _ => return Ok(files),
    };
    let prefix = format!("{}.", name);

    let mut rotated: Vec<PathBuf> = fs::read_dir(parent)
        .context(format!("Failed to list {}", parent.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.starts_with(&prefix))
        })
        .filter(|path| {
            let compressed = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| COMPRESSED_EXTENSIONS.contains(&e));
            if compressed {
                debug!("Skipping compressed log {}", path.display());
            }
            !compressed
        })
        .collect();
    rotated.sort();
    files.extend(rotated);
    Ok(files)
}

fn copy_logs(
    files: &[PathBuf],
    dest_dir: &Path,
    scrubber: &Scrubber,
    stop: &CancellationToken,
) -> Result<(usize, u64)> {
    let mut count = 0;
    let mut bytes = 0;

    for (i, source) in files.iter().enumerate() {
        if stop.is_cancelled() {
            bail!("Log copy stopped after {} file(s)", count);
        }
        let name = match source.file_name() {
            Some(name) => name,
            None => continue,
        };
        match copy_redacted(source, &dest_dir.join(name), scrubber, Some(stop)) {
            Ok(written) => {
                count += 1;
                bytes += written;
            }
            // Only the main log is required
            Err(e) if i == 0 => {
                return Err(e).context(format!("Failed to copy {}", source.display()));
            }
            Err(e) => warn!("Failed to copy rotated log {}: {}", source.display(), e),
        }
    }
    Ok((count, bytes))
}
