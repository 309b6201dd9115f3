//! Content hashing for change detection.
//!
//! Bodies are canonicalised before hashing so that line-ending churn and
//! trailing blank lines never count as an edit.

use sha2::{Digest, Sha256};

/// Canonical form of a page body: LF line endings, trailing whitespace at the
/// end of the document collapsed to a single newline. Empty bodies stay empty.
pub fn canonicalize(body: &str) -> String {
    let normalized = body.replace("\r\n", "\n");
    let trimmed = normalized.trim_end();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(trimmed.len() + 1);
    out.push_str(trimmed);
    out.push('\n');
    out
}

/// SHA-256 hex digest of the canonicalised body.
pub fn content_hash(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize(body).as_bytes());
    hex::encode(hasher.finalize())
}
