use sha2::{Digest, Sha256};

/// Content fingerprint used to verify transferred files.
///
/// Implementations must be deterministic: the same bytes always produce the
/// same digest string.
pub trait ContentDigest: Send + Sync {
    fn digest(&self, data: &[u8]) -> String;

    fn verify(&self, data: &[u8], expected: &str) -> bool {
        self.digest(data) == expected
    }
}

/// SHA-256, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Digest;

impl ContentDigest for Sha256Digest {
    fn digest(&self, data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }
}
