//! Security utilities for flare content.
//!
//! This module provides:
//! - Credential scrubbing with built-in and caller-supplied rules
//! - A redacting file sink used by every collector
//! - Path confinement for staging-area entries

pub mod credential_scrubber;
pub mod path_validator;
pub mod redacting_writer;

pub use credential_scrubber::{safe_error_message, scrub, scrub_str, Replacer, Scrubber};
pub use path_validator::{confined_path, sanitize_component};
pub use redacting_writer::{copy_redacted, write_redacted, RedactingWriter};
