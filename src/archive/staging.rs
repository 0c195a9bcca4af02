use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::{Builder, TempDir};
use uuid::Uuid;

use crate::constants::STAGING_DIR_PREFIX;

/// Ephemeral directory owned by exactly one flare run.
///
/// The directory name comes from a fresh UUID, never from host or caller
/// data. It is removed when the value is dropped, whichever way the run
/// ends.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
    host_root: PathBuf,
}

impl StagingArea {
    /// Create `<parent>/flare-<uuid>/<hostname>/`.
    ///
    /// `hostname` must already be a safe path component.
    pub fn create(parent: &Path, hostname: &str) -> io::Result<Self> {
        let name = format!("{}{}", STAGING_DIR_PREFIX, Uuid::new_v4().simple());
        let dir = Builder::new().prefix(&name).rand_bytes(0).tempdir_in(parent)?;
        let host_root = dir.path().join(hostname);
        fs::create_dir(&host_root)?;

        debug!("Created staging area {}", dir.path().display());
        Ok(Self { dir, host_root })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Collector output root, `<staging>/<hostname>`.
    pub fn host_root(&self) -> &Path {
        &self.host_root
    }

    /// Remove the staging area now, reporting removal errors that a plain
    /// drop would swallow.
    pub fn close(self) -> io::Result<()> {
        self.dir.close()
    }
}
