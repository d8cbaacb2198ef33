//! Shared utility functions for the storefront

use sha2::{Digest, Sha256};

/// Compare two secrets without leaking where they differ.
///
/// Both sides are hashed first so the comparison length never depends on
/// the attacker-supplied value.
pub fn secure_eq(expected: &str, provided: &str) -> bool {
    let a = Sha256::digest(expected.as_bytes());
    let b = Sha256::digest(provided.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secure_eq() {
        assert!(secure_eq("s3cret", "s3cret"));
        assert!(!secure_eq("s3cret", "s3cre"));
        assert!(!secure_eq("s3cret", ""));
    }
}
