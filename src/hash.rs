//! Content digests and stable identifiers
//!
//! Every hash in the system is a SHA-256 digest truncated to a short hex
//! prefix. Stable pattern identifiers are derived purely from the pattern's
//! coordinates, never from its reported locations, so the same logical
//! pattern has the same id across processes, machines, and re-scans.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Length in hex characters of short content hashes and stable ids
pub const SHORT_HASH_LEN: usize = 16;

fn truncated_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(SHORT_HASH_LEN);
    hex
}

/// Calculates the short content hash of a byte buffer
pub fn short_hash(content: &[u8]) -> String {
    truncated_sha256(content)
}

/// Calculates the short content hash of a file by streaming its contents,
/// reading no more than a fixed-size buffer at a time
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(SHORT_HASH_LEN);
    Ok(hex)
}

/// Derives the stable identifier of a pattern from its coordinates.
///
/// The id is a pure function of (category, subcategory, detector id,
/// detector-local pattern id). Re-running detection on unchanged input
/// re-derives identical ids.
pub fn stable_pattern_id(
    category: &str,
    subcategory: &str,
    detector_id: &str,
    local_id: &str,
) -> String {
    let input = format!("{category}/{subcategory}/{detector_id}/{local_id}");
    truncated_sha256(input.as_bytes())
}

/// Derives the codebase hash from per-file content hashes.
///
/// The input hashes are sorted before concatenation so the result is
/// independent of iteration order; it changes whenever any per-file hash
/// changes.
pub fn codebase_hash<I, S>(file_hashes: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hashes: Vec<String> = file_hashes
        .into_iter()
        .map(|h| h.as_ref().to_string())
        .collect();
    hashes.sort();
    truncated_sha256(hashes.concat().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_is_deterministic() {
        let a = stable_pattern_id("api", "rest", "api/rest-endpoint", "express-route");
        let b = stable_pattern_id("api", "rest", "api/rest-endpoint", "express-route");
        assert_eq!(a, b);
        assert_eq!(a.len(), SHORT_HASH_LEN);
    }

    #[test]
    fn test_stable_id_varies_with_coordinates() {
        let a = stable_pattern_id("api", "rest", "d", "p");
        let b = stable_pattern_id("api", "rest", "d", "q");
        let c = stable_pattern_id("auth", "rest", "d", "p");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_codebase_hash_is_order_independent() {
        let a = codebase_hash(["aaaa", "bbbb", "cccc"]);
        let b = codebase_hash(["cccc", "aaaa", "bbbb"]);
        assert_eq!(a, b);

        let changed = codebase_hash(["aaaa", "bbbb", "dddd"]);
        assert_ne!(a, changed);
    }

    #[test]
    fn test_hash_file_matches_buffer_hash() {
        let dir = std::env::temp_dir();
        let path = dir.join("driftscan-hash-test.txt");
        std::fs::write(&path, b"hello drift").unwrap();
        assert_eq!(hash_file(&path).unwrap(), short_hash(b"hello drift"));
        let _ = std::fs::remove_file(&path);
    }
}
