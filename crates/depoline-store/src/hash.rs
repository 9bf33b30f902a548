//! Blake3 content hashes for payload files

use std::io;
use std::path::Path;

pub fn hash_file(path: &Path) -> io::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path)?;
    Ok(hasher.finalize())
}

pub fn hash_bytes(data: &[u8]) -> blake3::Hash {
    blake3::hash(data)
}

/// Compare a file against a full hex digest. Missing files do not match.
pub fn file_matches(path: &Path, expected_hex: &str) -> io::Result<bool> {
    match hash_file(path) {
        Ok(h) => Ok(h.to_hex().as_str() == expected_hex),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// First 8 hex characters, for log lines.
pub fn short_hash(hex: &str) -> &str {
    &hex[..hex.len().min(8)]
}
