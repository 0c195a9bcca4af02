//! Utility functions for flare packaging.
//!
//! ## Components
//!
//! - **Compression**: atomic ZIP archive creation from the staging area
//! - **Hashing**: SHA-256 checksums for the file listing
//! - **Summary**: the `flare_summary.json` report
//!
//! ## Creating an archive
//!
//! ```no_run
//! use rs_flare::utils::compress::create_archive;
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let files = create_archive(
//!     Path::new("/tmp/flare-staging/web-01"),
//!     "web-01",
//!     Path::new("/tmp/flare.zip"),
//!     None,
//! )?;
//! println!("Archived {} files", files);
//! # Ok(())
//! # }
//! ```

/// Flare summary generation
pub mod summary;

/// ZIP archive creation
pub mod compress;

/// Cryptographic hash calculation utilities
pub mod hash;
