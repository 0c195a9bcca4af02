//! Flare collectors.
//!
//! Each collector gathers one class of artifact and writes it into the
//! staging area through a redacting writer. Collectors are independent of
//! each other; the assembler decides whether a failure is fatal.
//!
//! ## Collection order
//!
//! ```text
//! status -> logs -> config [-> expvar] -> envvars -> configcheck [-> docker_inspect -> docker_ps]
//! ```
//!
//! `expvar` only runs when a metrics source is configured. The container
//! collectors are only part of the set when
//! [`ContainerRuntime::is_available`](providers::ContainerRuntime::is_available)
//! reports a runtime at startup.

/// Core collector trait and collector set assembly
pub mod collector;

/// External data sources and their system-backed defaults
pub mod providers;

pub mod status;

pub mod logs;

pub mod config_files;

/// Runtime metrics groups
pub mod expvar;

pub mod envvars;

pub mod config_check;

/// Container self-inspection and container listing
pub mod docker;

pub use collector::{assemble_collectors, CollectContext, Collector};
pub use providers::{FlareSources, MetricsProvider};
