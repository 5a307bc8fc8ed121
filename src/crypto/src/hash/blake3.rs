//! BLAKE3 helpers for the state tree

use blake3::Hasher;

/// Hash of an empty subtree
pub const EMPTY_HASH: [u8; 32] = [0u8; 32];

/// Hash a byte slice
pub fn hash_bytes(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Hash two child nodes into their parent.
///
/// Two empty children hash to [`EMPTY_HASH`] so empty subtrees stay cheap
/// to compare.
pub fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    if *left == EMPTY_HASH && *right == EMPTY_HASH {
        return EMPTY_HASH;
    }
    let mut hasher = Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}
