use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use log::warn;
use serde_json::json;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::constants::MAX_HASH_SIZE_MB;
use crate::models::{CollectorReport, FileEntry};
use crate::utils::hash::calculate_sha256;

/// List every regular file below `root` with its size and checksum.
///
/// Paths are relative to `root` and use `/` separators. Files larger than
/// [`MAX_HASH_SIZE_MB`] are listed without a checksum.
pub fn list_files(root: &Path) -> Result<Vec<FileEntry>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry.context(format!("Failed to scan {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let sha256 = calculate_sha256(path, MAX_HASH_SIZE_MB).unwrap_or_else(|e| {
            warn!("Failed to hash {}: {}", name, e);
            None
        });

        files.push(FileEntry { path: name, size, sha256 });
    }
    Ok(files)
}

/// Create the JSON summary stored as `flare_summary.json`.
///
/// ```json
/// {
///   "flare_id": "550e8400-e29b-41d4-a716-446655440000",
///   "created_at": "2024-01-15T14:30:52+00:00",
///   "hostname": "web-01",
///   "version": "0.3.0",
///   "local": false,
///   "collectors": [{"name": "status", "status": "ok", ...}],
///   "files": [{"path": "status.log", "size": 120, "sha256": "..."}]
/// }
/// ```
pub fn create_flare_summary(
    hostname: &str,
    local: bool,
    collectors: &[CollectorReport],
    files: &[FileEntry],
) -> Result<String> {
    let summary = json!({
        "flare_id": Uuid::new_v4().to_string(),
        "created_at": Utc::now().to_rfc3339(),
        "hostname": hostname,
        "version": env!("CARGO_PKG_VERSION"),
        "os": std::env::consts::OS,
        "local": local,
        "collectors": collectors,
        "files": files,
    });

    serde_json::to_string_pretty(&summary).context("Failed to serialize flare summary to JSON")
}
