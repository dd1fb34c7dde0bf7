//! Content hashing for object identifiers
//!
//! All 32-byte identifiers in Cairn (darc ids, instance ids) are derived
//! from the same hash function over a canonical byte encoding. Keeping the
//! algorithm in one place means a single change-site if it ever needs to
//! be swapped.
//!
//! Current algorithm: **BLAKE3** (256-bit / 32-byte output).

/// Length in bytes of all content digests
pub const DIGEST_LEN: usize = 32;

/// Hash a byte slice into a 32-byte digest
pub fn hash(data: &[u8]) -> [u8; DIGEST_LEN] {
    *blake3::hash(data).as_bytes()
}

/// Incremental hasher for multi-part input
///
/// Use this when hashing a tag followed by variable-length content so the
/// parts cannot be confused with a single concatenated buffer of another
/// shape.
pub fn hasher() -> blake3::Hasher {
    blake3::Hasher::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_32_bytes_and_deterministic() {
        let a = hash(b"cairn");
        let b = hash(b"cairn");
        assert_eq!(a.len(), DIGEST_LEN);
        assert_eq!(a, b);
        assert_ne!(a, hash(b"cairns"));
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut h = hasher();
        h.update(b"hello");
        h.update(b" world");
        assert_eq!(*h.finalize().as_bytes(), hash(b"hello world"));
    }
}
