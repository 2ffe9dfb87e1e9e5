use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::constants::{COLLISION_SEPARATOR, FULL_HASH_THRESHOLD, HASH_SAMPLE_SIZE};

/// How much of a buffer is fed to the content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashStrategy {
    /// Hash small buffers in full and large buffers by head, middle and tail
    /// samples plus their length. Collisions are caught by byte comparison.
    #[default]
    Sampled,
    /// Always hash the whole buffer.
    Full,
}

/// Computes the hex SHA-256 content hash of `data`.
pub fn content_hash(data: &[u8], strategy: HashStrategy) -> String {
    let mut hasher = Sha256::new();
    let len = data.len();

    if strategy == HashStrategy::Full || len < FULL_HASH_THRESHOLD {
        hasher.update(data);
    } else {
        let mid = len / 2 - HASH_SAMPLE_SIZE / 2;
        hasher.update(&data[..HASH_SAMPLE_SIZE]);
        hasher.update(&data[mid..mid + HASH_SAMPLE_SIZE]);
        hasher.update(&data[len - HASH_SAMPLE_SIZE..]);
    }
    hasher.update((len as u64).to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// Key of a stored content entry.
///
/// The key is the content hash plus a serial that tells apart distinct
/// contents whose hashes collide. Serial 0 is the first content seen for a
/// hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    hash: Arc<str>,
    serial: u32,
}

impl ContentKey {
    pub(crate) fn new(hash: Arc<str>, serial: u32) -> Self {
        Self { hash, serial }
    }

    /// Returns the content hash part of the key.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Returns the collision serial.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub(crate) fn hash_arc(&self) -> &Arc<str> {
        &self.hash
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.serial == 0 {
            f.write_str(&self.hash)
        } else {
            write!(f, "{}{}{}", self.hash, COLLISION_SEPARATOR, self.serial)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_buffers_hash_in_full() {
        let a = content_hash(b"abc", HashStrategy::Sampled);
        let b = content_hash(b"abd", HashStrategy::Sampled);
        assert_ne!(a, b);
        assert_eq!(a, content_hash(b"abc", HashStrategy::Full));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_sampled_hash_ignores_unsampled_bytes() {
        let mut a = vec![7u8; 8192];
        let b = a.clone();
        // Byte 1024 is outside the head, middle and tail samples.
        a[1024] = 0;
        assert_eq!(
            content_hash(&a, HashStrategy::Sampled),
            content_hash(&b, HashStrategy::Sampled)
        );
        assert_ne!(
            content_hash(&a, HashStrategy::Full),
            content_hash(&b, HashStrategy::Full)
        );
    }

    #[test]
    fn test_length_is_part_of_the_hash() {
        let a = vec![1u8; 4096];
        let b = vec![1u8; 4097];
        assert_ne!(
            content_hash(&a, HashStrategy::Sampled),
            content_hash(&b, HashStrategy::Sampled)
        );
    }

    #[test]
    fn test_key_display() {
        let hash: Arc<str> = Arc::from("deadbeef");
        assert_eq!(ContentKey::new(hash.clone(), 0).to_string(), "deadbeef");
        assert_eq!(ContentKey::new(hash, 2).to_string(), "deadbeef~2");
    }
}
