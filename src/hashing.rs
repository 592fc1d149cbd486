use sha2::{Digest, Sha256};

/// Hex encoded SHA-256 of a URL, used to build stable names for URLs whose
/// path carries no usable file name.
pub fn url_digest(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
