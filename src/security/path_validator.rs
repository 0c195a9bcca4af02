//! Path validation for entries written into the staging area.
//!
//! Collector output names partly come from outside data (config labels,
//! file names found on disk, the hostname). Everything is funnelled through
//! these helpers so nothing can land outside the staging root.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Result};

/// Resolve `relative` under `root`, refusing anything that could escape it.
///
/// # Arguments
///
/// * `root` - The directory every entry must stay within
/// * `relative` - The entry path, relative to `root`
///
/// # Returns
///
/// * `Ok(PathBuf)` - `root` joined with the normalized entry path
/// * `Err` - If the entry is absolute, contains `..` or null bytes
pub fn confined_path(root: &Path, relative: &Path) -> Result<PathBuf> {
    if relative.to_string_lossy().contains('\0') {
        bail!("Path contains null bytes");
    }

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(name) => resolved.push(name),
            Component::CurDir => {}
            Component::ParentDir => {
                bail!("Path traversal attempt detected: path contains '..'");
            }
            Component::RootDir | Component::Prefix(_) => {
                bail!("Absolute paths not allowed inside the staging area: {}", relative.display());
            }
        }
    }

    if resolved == root {
        bail!("Empty entry path");
    }
    Ok(resolved)
}

/// Sanitize a single path component such as a hostname or a config label.
///
/// Separators and characters that are invalid on common filesystems become
/// `_`; a name made only of dots is prefixed so it cannot mean `.` or `..`.
pub fn sanitize_component(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());

    for ch in name.chars() {
        match ch {
            '\0' => continue,
            '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*' => sanitized.push('_'),
            c if c.is_control() => sanitized.push('_'),
            c => sanitized.push(c),
        }
    }

    let sanitized = sanitized.trim().to_string();
    if !sanitized.is_empty() && sanitized.chars().all(|c| c == '.') {
        return format!("_{}", sanitized);
    }
    sanitized
}
