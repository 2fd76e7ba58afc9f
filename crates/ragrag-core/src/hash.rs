//! Content fingerprints and chunk identity.
//!
//! The content hash is a change detector, never an identity key on its own:
//! chunk ids always mix in the `source_id`, so two different paths with
//! identical bytes still get disjoint chunk ids.

use sha2::{Digest, Sha256};

/// Length of a chunk id in hex characters (128 bits).
const CHUNK_ID_HEX_LEN: usize = 32;

/// Lowercase hex SHA-256 of `content`.
pub fn content_hash(content: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_ref());
    format!("{:x}", hasher.finalize())
}

/// Deterministic chunk id for `(source_id, chunk_index, content_hash)`.
///
/// The same triple always yields the same id; a changed document hash
/// produces a disjoint id set for the same source.
pub fn chunk_id(source_id: &str, chunk_index: usize, content_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk_index.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(content_hash.as_bytes());
    let mut id = format!("{:x}", hasher.finalize());
    id.truncate(CHUNK_ID_HEX_LEN);
    id
}
