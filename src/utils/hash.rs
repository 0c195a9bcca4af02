use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::constants::DEFAULT_BUFFER_SIZE;

/// Calculate the SHA-256 of a file as lowercase hex.
///
/// Returns `None` for anything that is not a regular file or is larger than
/// `max_size_mb`.
pub fn calculate_sha256(path: &Path, max_size_mb: u64) -> io::Result<Option<String>> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() || metadata.len() > max_size_mb * 1024 * 1024 {
        return Ok(None);
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DEFAULT_BUFFER_SIZE];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Some(format!("{:x}", hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() -> io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc")?;
        assert_eq!(
            calculate_sha256(&path, 1)?.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        Ok(())
    }

    #[test]
    fn test_directories_and_oversized_files_skipped() -> io::Result<()> {
        let dir = TempDir::new()?;
        assert_eq!(calculate_sha256(dir.path(), 1)?, None);

        let path = dir.path().join("big.bin");
        std::fs::write(&path, vec![0u8; 2 * 1024 * 1024])?;
        assert_eq!(calculate_sha256(&path, 1)?, None);
        assert!(calculate_sha256(&path, 2)?.is_some());
        Ok(())
    }
}
