use sha2::{Digest, Sha256};

/// SHA-256 hex digest of file content. Canonical producer of
/// `FileDescriptor::content_hash` for callers feeding the diff engine.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
