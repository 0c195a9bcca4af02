//! Global constants for the rs-flare application.
//!
//! This module centralizes the artifact names and tuning values shared by
//! the collectors, the assembler and the packaging code.

// Redaction
/// Marker written in place of every redacted secret
pub const REDACTION_MARKER: &str = "********";

// Buffer size constants
/// Default buffer size for file operations (1MB)
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Chunk size for compression and log streaming (512KB)
pub const COMPRESSION_CHUNK_SIZE: usize = 512 * 1024;

/// Longest partial line the redacting writer holds back (64KB)
pub const MAX_PENDING_LINE_BYTES: usize = 64 * 1024;

// File size thresholds
/// Large file threshold for compression decisions (100MB)
pub const LARGE_FILE_COMPRESSION_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Files above this size are not hashed for the summary (MB)
pub const MAX_HASH_SIZE_MB: u64 = 512;

// Timeouts
/// Default upper bound for a single collector, in seconds
pub const DEFAULT_COLLECTOR_TIMEOUT_SECS: u64 = 30;

/// How long a resolved hostname stays cached, in seconds
pub const HOSTNAME_CACHE_SECS: u64 = 300;

// Host identity
/// Archive root directory used when the hostname cannot be resolved
pub const UNKNOWN_HOSTNAME: &str = "unknown";

/// Prefix of every staging directory
pub const STAGING_DIR_PREFIX: &str = "flare-";

// Artifact names inside the archive
pub const STATUS_FILE_NAME: &str = "status.log";
pub const LOCAL_SENTINEL_NAME: &str = "local";
pub const LOGS_DIR_NAME: &str = "logs";
pub const ETC_DIR_NAME: &str = "etc";
pub const CONFD_DIR_NAME: &str = "confd";
pub const ENVVARS_FILE_NAME: &str = "envvars.log";
pub const CONFIG_CHECK_FILE_NAME: &str = "configcheck.log";
pub const EXPVAR_DIR_NAME: &str = "expvar";
pub const DOCKER_INSPECT_FILE_NAME: &str = "docker_inspect.log";
pub const DOCKER_PS_FILE_NAME: &str = "docker_ps.log";
pub const SUMMARY_FILE_NAME: &str = "flare_summary.json";

// Collector names
pub const COLLECTOR_STATUS: &str = "status";
pub const COLLECTOR_LOGS: &str = "logs";
pub const COLLECTOR_CONFIG: &str = "config";
pub const COLLECTOR_EXPVAR: &str = "expvar";
pub const COLLECTOR_ENVVARS: &str = "envvars";
pub const COLLECTOR_CONFIG_CHECK: &str = "configcheck";
pub const COLLECTOR_DOCKER_INSPECT: &str = "docker_inspect";
pub const COLLECTOR_DOCKER_PS: &str = "docker_ps";

// Common file extensions
pub const COMPRESSED_EXTENSIONS: &[&str] = &[
    "zip", "gz", "xz", "bz2", "7z", "rar", "jpg", "jpeg", "png", "gif", "mp3", "mp4", "avi", "mov",
    "mpg", "mpeg",
];

/// Extensions picked up by the config collector unless overridden
pub const DEFAULT_CONFIG_EXTENSIONS: &[&str] = &[
    "yaml", "yml", "yaml.default", "yaml.example", "json", "conf", "toml",
];

/// Length of a short container id in the `docker_ps.log` table
pub const SHORT_CONTAINER_ID_LEN: usize = 12;
