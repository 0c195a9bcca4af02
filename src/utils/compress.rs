use std::fs;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use zip::{write::FileOptions, ZipWriter};

use crate::constants::{
    COMPRESSED_EXTENSIONS, COMPRESSION_CHUNK_SIZE as CHUNK_SIZE, LARGE_FILE_COMPRESSION_THRESHOLD,
};

/// Deflate level for a file: fast for already-compressed or very large
/// files, the default level otherwise.
fn compression_level(path: &Path) -> i32 {
    let low_compression = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => COMPRESSED_EXTENSIONS.contains(&ext),
        _ => false,
    };

    let large_file = match fs::metadata(path) {
        Ok(metadata) if metadata.len() > LARGE_FILE_COMPRESSION_THRESHOLD => true,
        _ => false,
    };

    if low_compression || large_file {
        1
    } else {
        6
    }
}

/// ZIP options for a single archive entry.
pub fn get_compression_options(path: &Path) -> FileOptions {
    FileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(compression_level(path)))
        .unix_permissions(0o644)
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    if cancel.map_or(false, |token| token.is_cancelled()) {
        bail!("Archive creation cancelled");
    }
    Ok(())
}

/// Entry name inside the archive: `<prefix>/<relative path>` with `/` separators.
fn entry_name(prefix: &str, relative: &Path) -> String {
    let mut name = String::from(prefix);
    for component in relative.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

/// Files and directories below `source_dir`, in a stable order.
fn scan_directory(source_dir: &Path) -> Result<Vec<(PathBuf, bool)>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(source_dir).min_depth(1).follow_links(false).sort_by_file_name() {
        let entry = entry.context(format!("Failed to scan {}", source_dir.display()))?;
        let file_type = entry.file_type();
        if file_type.is_dir() || file_type.is_file() {
            entries.push((entry.into_path(), file_type.is_dir()));
        }
    }
    Ok(entries)
}

/// Compress `source_dir` into a ZIP archive at `target`.
///
/// Every entry is stored under a top-level `prefix/` directory. The archive
/// is written to a temporary file next to `target` and renamed into place
/// only once it is complete, so a failed or cancelled run never leaves a
/// file at `target`. The cancellation token is checked between entries.
///
/// Returns the number of files written.
pub fn create_archive(
    source_dir: &Path,
    prefix: &str,
    target: &Path,
    cancel: Option<&CancellationToken>,
) -> Result<usize> {
    let start = Instant::now();
    let target_dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    if !target_dir.is_dir() {
        bail!("Archive directory {} does not exist", target_dir.display());
    }

    let entries = scan_directory(source_dir)?;
    let mut tmp = NamedTempFile::new_in(target_dir)
        .context(format!("Failed to create temporary archive in {}", target_dir.display()))?;

    let mut files = 0;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let dir_options = FileOptions::default().unix_permissions(0o755);
        zip.add_directory(prefix, dir_options)
            .context("Failed to add archive root directory")?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        for (path, is_dir) in &entries {
            check_cancelled(cancel)?;

            let relative = path
                .strip_prefix(source_dir)
                .context(format!("{} is outside {}", path.display(), source_dir.display()))?;
            let name = entry_name(prefix, relative);

            if *is_dir {
                zip.add_directory(name, dir_options)
                    .context(format!("Failed to add directory {}", relative.display()))?;
                continue;
            }

            let file = fs::File::open(path).context(format!("Failed to open {}", path.display()))?;
            let mut reader = BufReader::new(file);
            zip.start_file(name.as_str(), get_compression_options(path))
                .context(format!("Failed to start file entry for {}", name))?;
            loop {
                let bytes_read = reader
                    .read(&mut buffer)
                    .context(format!("Failed to read from {}", path.display()))?;
                if bytes_read == 0 {
                    break;
                }
                zip.write_all(&buffer[..bytes_read])
                    .context(format!("Failed to write to zip for {}", name))?;
            }
            debug!("Added {} to archive", name);
            files += 1;
        }

        check_cancelled(cancel)?;
        zip.finish().context("Failed to finalize ZIP archive")?;
    }

    tmp.as_file().sync_all().context("Failed to sync archive")?;
    tmp.persist(target)
        .map_err(|e| e.error)
        .context(format!("Failed to move archive into place at {}", target.display()))?;

    info!(
        "Created archive {} ({} files) in {:?}",
        target.display(),
        files,
        start.elapsed()
    );
    Ok(files)
}
