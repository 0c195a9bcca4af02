// Re-export all items from the submodules
mod env_vars;
mod flare_config;

pub use flare_config::{load_or_default, FlareConfig, RedactionRule};

pub use env_vars::{expand_env_vars, expand_with, normalize_path_for_os};
