//! File sink that scrubs every byte before it reaches disk.
//!
//! Output is line buffered: complete lines are scrubbed and written as soon
//! as they arrive, a trailing partial line waits for its newline or for
//! [`RedactingWriter::close`]. A secret split across two `write` calls is
//! therefore still seen whole by the scrubber.
//!
//! A partial line is held back up to [`MAX_PENDING_LINE_BYTES`]. Past that it
//! is emitted up to its last whitespace, so input without newlines streams
//! through in bounded memory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use crate::constants::{COMPRESSION_CHUNK_SIZE, MAX_PENDING_LINE_BYTES};
use crate::error::{FlareError, Result};
use crate::security::credential_scrubber::{Replacer, Scrubber};

/// A write handle that redacts secrets on the way to `path`.
///
/// The handle is owned by exactly one collector at a time; it is not meant
/// to be shared between writers.
pub struct RedactingWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    scrubber: Scrubber,
    pending: Vec<u8>,
    started: bool,
    bytes_written: u64,
}

impl RedactingWriter {
    /// Open `path` for writing with only the built-in rules active.
    ///
    /// Parent directories are created as needed.
    pub fn create(path: &Path) -> Result<Self> {
        Self::create_with(path, &Scrubber::new())
    }

    /// Open `path` for writing, starting from the rules in `base`.
    pub fn create_with(path: &Path, base: &Scrubber) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        let file = options.open(path)?;

        debug!("Opened redacting writer for {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(BufWriter::new(file)),
            scrubber: base.clone(),
            pending: Vec::new(),
            started: false,
            bytes_written: 0,
        })
    }

    /// Add a replacer scoped to this handle.
    ///
    /// Must be called before the first write; afterwards earlier output
    /// would have escaped the rule, so registration is refused.
    pub fn register_replacer(&mut self, replacer: Replacer) -> Result<()> {
        if self.started {
            return Err(FlareError::RedactionConfig(format!(
                "replacer '{}' registered after first write to {}",
                replacer.pattern(),
                self.path.display()
            )));
        }
        self.scrubber.add_replacer(replacer);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scrubbed bytes written to disk so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush everything, including a trailing partial line, and release the file.
    ///
    /// Returns the number of scrubbed bytes written.
    pub fn close(mut self) -> Result<u64> {
        self.finish()?;
        Ok(self.bytes_written)
    }

    fn emit(&mut self, data: &[u8]) -> io::Result<()> {
        let scrubbed = self.scrubber.scrub(data);
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "redacting writer already closed"))?;
        file.write_all(&scrubbed)?;
        self.bytes_written += scrubbed.len() as u64;
        Ok(())
    }

    /// Drop buffered output and remove the partially written file.
    fn discard(mut self) {
        self.pending.clear();
        self.file = None;
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Failed to remove partial {}: {}", self.path.display(), e);
        }
    }

    /// Emit the partial line while it is over the cap, splitting after the
    /// last whitespace inside the cap when there is one.
    fn drain_oversized(&mut self) -> io::Result<()> {
        while self.pending.len() >= MAX_PENDING_LINE_BYTES {
            let split = self.pending[..MAX_PENDING_LINE_BYTES]
                .iter()
                .rposition(|b| b.is_ascii_whitespace())
                .map_or(MAX_PENDING_LINE_BYTES, |pos| pos + 1);
            let head: Vec<u8> = self.pending.drain(..split).collect();
            self.emit(&head)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        if self.file.is_none() {
            return Ok(());
        }
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            self.emit(&rest)?;
        }
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

impl Write for RedactingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.started = true;

        // Only the new bytes can hold the newline that completes a line
        match buf.iter().rposition(|&b| b == b'\n') {
            Some(pos) => {
                let mut complete = std::mem::take(&mut self.pending);
                complete.extend_from_slice(&buf[..=pos]);
                self.emit(&complete)?;
                self.pending.extend_from_slice(&buf[pos + 1..]);
            }
            None => self.pending.extend_from_slice(buf),
        }
        self.drain_oversized()?;
        Ok(buf.len())
    }

    /// Flushes complete lines only; a partial line stays buffered until close.
    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for RedactingWriter {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            warn!("Failed to flush {}: {}", self.path.display(), e);
        }
    }
}

/// Write `content` to `path` through a fresh redacting writer.
pub fn write_redacted(path: &Path, base: &Scrubber, content: &[u8]) -> Result<u64> {
    let mut writer = RedactingWriter::create_with(path, base)?;
    writer.write_all(content)?;
    writer.close()
}

/// Stream `source` into `dest` through a redacting writer, chunk by chunk.
///
/// `stop` is checked before every chunk. Once it fires the partial `dest`
/// is removed and [`FlareError::Cancelled`] is returned.
pub fn copy_redacted(
    source: &Path,
    dest: &Path,
    base: &Scrubber,
    stop: Option<&CancellationToken>,
) -> Result<u64> {
    let stopped = || stop.map_or(false, |s| s.is_cancelled());
    if stopped() {
        return Err(FlareError::Cancelled);
    }

    let mut reader = File::open(source)?;
    let mut writer = RedactingWriter::create_with(dest, base)?;
    let mut buffer = vec![0u8; COMPRESSION_CHUNK_SIZE];

    loop {
        if stopped() {
            debug!("Copy of {} stopped", source.display());
            writer.discard();
            return Err(FlareError::Cancelled);
        }
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
    }
    writer.close()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_writes_are_scrubbed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.log");

        let mut writer = RedactingWriter::create(&path).unwrap();
        writer.write_all(b"api_key=ABCDEF1234\nplain line\n").unwrap();
        writer.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "api_key=********\nplain line\n");
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/out.log");

        write_redacted(&path, &Scrubber::new(), b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }

    #[test]
    fn test_secret_split_across_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("split.log");

        let mut writer = RedactingWriter::create(&path).unwrap();
        writer.write_all(b"password=hun").unwrap();
        writer.write_all(b"ter2 rest\nnext").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.bytes_written(), "password=********\n".len() as u64);
        writer.write_all(b" token=abc").unwrap();
        writer.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "password=********\nnext token=********");
        assert!(!content.contains("hunter2"));
    }

    #[test]
    fn test_register_after_write_fails() {
        let dir = TempDir::new().unwrap();
        let mut writer = RedactingWriter::create(&dir.path().join("x.log")).unwrap();
        writer.write_all(b"first\n").unwrap();

        let err = writer
            .register_replacer(Replacer::literal("first", "second").unwrap())
            .unwrap_err();
        assert!(matches!(err, FlareError::RedactionConfig(_)));
    }

    #[test]
    fn test_registered_replacer_applies_before_builtins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.log");

        let mut writer = RedactingWriter::create(&path).unwrap();
        writer
            .register_replacer(Replacer::literal(r"internal-(\w+)", "host-$1").unwrap())
            .unwrap();
        writer.write_all(b"internal-db01 secret: abc\n").unwrap();
        let written = writer.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "host-db01 secret: ********\n");
        assert_eq!(written, content.len() as u64);
    }

    #[test]
    fn test_copy_redacted_large_input() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("big.log");
        let dest = dir.path().join("out/big.log");

        // Spans several read chunks
        let line = "2024-01-01 INFO request served token=abcdef\n";
        let content = line.repeat(COMPRESSION_CHUNK_SIZE / line.len() * 3);
        fs::write(&source, &content).unwrap();

        copy_redacted(&source, &dest, &Scrubber::new(), None).unwrap();
        let copied = fs::read_to_string(&dest).unwrap();
        assert!(!copied.contains("abcdef"));
        assert_eq!(copied.lines().count(), content.lines().count());
    }

    #[test]
    fn test_input_without_newlines_streams() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("oneline.log");
        let chunk = "xyz ".repeat(COMPRESSION_CHUNK_SIZE / 4);

        let mut writer = RedactingWriter::create(&path).unwrap();
        for _ in 0..6 {
            writer.write_all(chunk.as_bytes()).unwrap();
            assert!(writer.pending.len() < MAX_PENDING_LINE_BYTES);
        }
        let total = (chunk.len() * 6) as u64;
        assert!(writer.bytes_written() > total - MAX_PENDING_LINE_BYTES as u64);
        writer.write_all(b"password=hunter2").unwrap();
        writer.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.len() as u64, total + "password=********".len() as u64);
        assert!(content.ends_with("xyz password=********"));
    }

    #[test]
    fn test_oversized_token_is_split_at_the_cap() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blob.log");
        let blob = vec![b'x'; MAX_PENDING_LINE_BYTES * 2 + 10];

        let mut writer = RedactingWriter::create(&path).unwrap();
        writer.write_all(&blob).unwrap();
        assert_eq!(writer.pending.len(), 10);
        writer.close().unwrap();
        assert_eq!(fs::read(&path).unwrap(), blob);
    }

    #[test]
    fn test_stopped_copy_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("svc.log");
        fs::write(&source, "line\n".repeat(1000)).unwrap();
        let stop = CancellationToken::new();
        stop.cancel();

        let dest = dir.path().join("staging/logs/svc.log");
        let err = copy_redacted(&source, &dest, &Scrubber::new(), Some(&stop)).unwrap_err();

        assert!(matches!(err, FlareError::Cancelled));
        assert!(!dest.exists());
        assert!(!dir.path().join("staging").exists());
    }

    #[test]
    fn test_discard_removes_partial_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.log");

        let mut writer = RedactingWriter::create(&path).unwrap();
        writer.write_all(b"complete line\npartial").unwrap();
        writer.discard();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_flushes_pending() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dropped.log");
        {
            let mut writer = RedactingWriter::create(&path).unwrap();
            writer.write_all(b"no newline pwd=x").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "no newline pwd=********");
    }
}
