//! Conflict policy: the remote copy always wins.
//!
//! Humans edit the remote; agents edit the mirror. When both changed since
//! the last sync the local edit is overwritten in the working tree. It
//! survives in version-control history only if it was committed. This is a
//! whole-page, directional rule; no text merge is attempted.

/// Side whose content ends up in the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WinningSide {
    Remote,
    /// Never returned by [`resolve_conflict`]; reserved for a local-first
    /// policy.
    Local,
}

/// Result of resolving one conflicted page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub winner: WinningSide,
    /// The local edit differs from the winning content and is dropped from
    /// the working tree.
    pub discards_local_edit: bool,
}

/// Resolve a page changed on both sides, given the hash of the fetched
/// remote body and the hash of the current local body.
pub fn resolve_conflict(remote_hash: &str, local_hash: &str) -> Resolution {
    Resolution {
        winner: WinningSide::Remote,
        discards_local_edit: remote_hash != local_hash,
    }
}
