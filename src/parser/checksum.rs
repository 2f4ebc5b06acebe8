//! Content checksums in `sha256:<hex>` form

use sha2::{Digest, Sha256};

/// Normalize content for checksum calculation
///
/// Prevents false "stale" detection from whitespace-only changes:
/// - Normalize line endings (CRLF → LF)
/// - Trim trailing whitespace per line
/// - Remove trailing newlines
fn normalize_for_checksum(content: &str) -> String {
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}

/// Checksum of normalized text, used for staleness detection
pub fn calculate_checksum(content: &str) -> String {
    calculate_bytes_checksum(normalize_for_checksum(content).as_bytes())
}

/// Exact checksum of raw bytes, used for snapshot integrity
pub fn calculate_bytes_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}
