//! # rs-flare
//!
//! Builds diagnostic archives ("flares") for a running service, with every
//! collected byte passed through a secret scrubber before it touches disk.
//!
//! ## Overview
//!
//! A flare run stages the service status, logs, configuration, environment,
//! a configuration self-check and, inside containers, the container
//! inspection and listing into a private temporary directory. The result is
//! packaged as a single ZIP archive rooted at the host name, and the staging
//! directory is removed whatever happens.
//!
//! ## Usage
//!
//! ```no_run
//! use rs_flare::collectors::FlareSources;
//! use rs_flare::config::FlareConfig;
//! use rs_flare::{BundleRequest, FlareBuilder};
//!
//! # async fn example() -> Result<(), rs_flare::FlareError> {
//! let config = FlareConfig::default();
//! let builder = FlareBuilder::new(config.clone(), FlareSources::system(&config))?;
//!
//! let request = BundleRequest::new("/tmp/flare.zip")
//!     .log_file("/var/log/svc/svc.log")
//!     .search_path("", "/etc/svc/conf.d");
//!
//! let outcome = builder.create_flare(&request).await?;
//! println!("Flare written to {}", outcome.archive_path.display());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument parsing
//! - [`models`]: Requests, outcomes and summary records
//! - [`error`]: The [`FlareError`] taxonomy
//! - [`collectors`]: Artifact collectors and their data sources
//! - [`archive`]: Staging, collection orchestration and packaging
//! - [`config`]: Configuration loading
//! - [`utils`]: Compression, hashing and the flare summary
//! - [`security`]: Secret scrubbing, the redacting writer and path validation
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Core data models and structures used throughout the application
pub mod models;

/// Error types surfaced to callers
pub mod error;

/// Flare collectors and the sources they read from
pub mod collectors;

/// Flare assembly state machine
pub mod archive;

/// Utility functions for compression, hashing, and the summary
pub mod utils;

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Security utilities for credential scrubbing and path validation
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;

pub use archive::FlareBuilder;
pub use error::FlareError;
pub use models::{BundleRequest, FlareOutcome};
