//! Identity Resolution
//!
//! Derives a stable identity key for a caller: the licence key for paid
//! callers, or a salted SHA-256 hash of the client address for anonymous
//! demo callers. Raw addresses are never stored or logged; only the hash
//! ever reaches the rate limiter.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded salted hash of a client address
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct AddrHash(String);

impl AddrHash {
    /// The hex digest as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddrHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Truncated for logs; full digest is only used as a store key
        write!(f, "{}…", &self.0[..12.min(self.0.len())])
    }
}

/// Stable identity key for an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKey {
    /// Paid caller, identified by an opaque licence key
    Licence(String),
    /// Anonymous demo caller, identified by a hashed client address
    Anonymous(AddrHash),
}

/// Salted hasher for anonymous client addresses
#[derive(Clone)]
pub struct AddrHasher {
    salt: Vec<u8>,
}

impl AddrHasher {
    /// Create a hasher with the process-wide salt from configuration
    pub fn new(salt: impl AsRef<[u8]>) -> Self {
        Self {
            salt: salt.as_ref().to_vec(),
        }
    }

    /// Hash a client address into a stable, non-reversible key
    pub fn hash_addr(&self, addr: &str) -> AddrHash {
        let mut hasher = Sha256::new();
        hasher.update(&self.salt);
        hasher.update(addr.as_bytes());
        AddrHash(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        let hasher = AddrHasher::new(b"test-salt");
        let h1 = hasher.hash_addr("203.0.113.7");
        let h2 = hasher.hash_addr("203.0.113.7");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_different_addresses_differ() {
        let hasher = AddrHasher::new(b"test-salt");
        let h1 = hasher.hash_addr("203.0.113.7");
        let h2 = hasher.hash_addr("203.0.113.8");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_salt_changes_hash() {
        let h1 = AddrHasher::new(b"salt-a").hash_addr("203.0.113.7");
        let h2 = AddrHasher::new(b"salt-b").hash_addr("203.0.113.7");
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_display_truncates() {
        let hasher = AddrHasher::new(b"test-salt");
        let h = hasher.hash_addr("203.0.113.7");
        let shown = format!("{}", h);
        assert!(shown.len() < h.as_str().len());
    }
}
