use sha2::{Digest, Sha256};

/// Lowercase-hex SHA-256 of the manifest file's bytes (SPEC_FULL.md §3).
pub fn of(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_hash_the_same() {
        assert_eq!(of(b"hello"), of(b"hello"));
    }

    #[test]
    fn different_bytes_hash_differently() {
        assert_ne!(of(b"hello"), of(b"world"));
    }
}
