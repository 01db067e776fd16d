//! Embedding provider contract.
//!
//! The store never converts text to vectors itself: an [`EmbeddingProvider`]
//! is injected at construction and owned by the caller. The contract is that
//! `encode` is deterministic for identical text under a fixed model, and that
//! the returned dimension never changes for the provider's lifetime.
//!
//! Provider calls are assumed to be expensive (model inference) and are
//! always made before any store-internal lock is taken.

use crate::error::{MemoryError, Result};
use crate::validation::validate_embedding;

/// Text-to-vector capability injected into the store.
///
/// Implementations must be `Send + Sync`: the store is shared across threads
/// and calls `encode` concurrently from readers.
pub trait EmbeddingProvider: Send + Sync {
    /// The fixed output dimension of this provider.
    fn dimensions(&self) -> usize;

    /// Encode text into a vector of length [`Self::dimensions`].
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Encoding`] if inference fails. The store also
    /// rejects vectors of the wrong length or containing NaN/Inf.
    fn encode(&self, text: &str) -> Result<Vec<f32>>;
}

/// Encode text and validate the result against the provider's contract.
pub(crate) fn encode_checked(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let embedding = provider.encode(text)?;
    validate_embedding(&embedding, provider.dimensions())
        .map_err(|e| MemoryError::Encoding(e.to_string()))?;
    Ok(embedding)
}

// ─────────────────────────────────────────────────────────────────────────────
// Hashing Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic token-hash embedder.
///
/// Lowercases the text, splits on non-alphanumeric boundaries, hashes each
/// token into a bucket, and L2-normalizes the bucket counts. Identical text
/// always yields the identical vector, and texts sharing tokens land near
/// each other.
///
/// This is not a semantic model; it exists for tests and for running the
/// store without inference available.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dims: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of the given dimension.
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// FNV-1a, stable across platforms and runs.
    fn hash_token(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dims
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dims];

        let lowered = text.to_lowercase();
        for token in lowered.split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let hash = Self::hash_token(token);
            let bucket = (hash % self.dims as u64) as usize;
            // Sign bit from the hash spreads tokens across both half-spaces.
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashing_embedder_deterministic() {
        let embedder = HashingEmbedder::new(32);
        let a = embedder.encode("my new job at the office").unwrap();
        let b = embedder.encode("my new job at the office").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hashing_embedder_dimension() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.encode("hello world").unwrap();
        assert_eq!(v.len(), 16);
    }

    #[test]
    fn test_hashing_embedder_normalized() {
        let embedder = HashingEmbedder::new(32);
        let v = embedder.encode("some text with several words").unwrap();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        let v = embedder.encode("").unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_hashing_embedder_distinguishes_texts() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.encode("cats and dogs").unwrap();
        let b = embedder.encode("quantum field theory").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_encode_checked_rejects_wrong_dimension() {
        struct BadProvider;
        impl EmbeddingProvider for BadProvider {
            fn dimensions(&self) -> usize {
                8
            }
            fn encode(&self, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![0.0; 4])
            }
        }

        let err = encode_checked(&BadProvider, "x").unwrap_err();
        assert!(matches!(err, MemoryError::Encoding(_)));
    }
}
