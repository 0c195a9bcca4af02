use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex =
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)|%([A-Za-z_][A-Za-z0-9_]*)%")
            .expect("env var pattern");
}

/// Expand `${VAR}`, `$VAR` and `%VAR%` references using the process environment.
pub fn expand_env_vars(path: &str) -> String {
    expand_with(path, |name| std::env::var(name).ok())
}

/// Expand variable references with a custom lookup.
///
/// An unset `${VAR}` expands to nothing; an unset `$VAR` or `%VAR%` is left
/// untouched so a literal `$` or `%` in a path survives.
pub fn expand_with<F>(path: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if !path.contains('$') && !path.contains('%') {
        return path.to_string();
    }

    let expanded: Cow<str> = ENV_VAR_PATTERN.replace_all(path, |caps: &Captures| {
        if let Some(name) = caps.get(1) {
            return lookup(name.as_str()).unwrap_or_default();
        }
        let name = caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str()).unwrap_or_default();
        lookup(name).unwrap_or_else(|| caps[0].to_string())
    });
    expanded.into_owned()
}

/// Normalize path separators for the current OS
pub fn normalize_path_for_os(path: &str) -> String {
    if cfg!(windows) {
        path.replace('/', "\\")
    } else {
        path.replace('\\', "/")
    }
}
