//! Content fingerprint used exclusively for bloom insertion (never persisted).

use sha2::{Digest, Sha256};

/// Derives a 64-hex-character SHA-256 digest from `title ⊕ description ⊕ diff`.
pub fn content_fingerprint(title: &str, description: &str, diff: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(description.as_bytes());
    hasher.update(diff.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
