//! Validation utilities for data entering the store.

use crate::error::MemoryError;

// ─────────────────────────────────────────────────────────────────────────────
// Validation Error
// ─────────────────────────────────────────────────────────────────────────────

/// Specific validation error types for store inputs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    /// Entry text is empty.
    #[error("entry text is empty")]
    EmptyText,

    /// Embedding dimension mismatch.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },

    /// Embedding contains invalid values (NaN or Inf).
    #[error("embedding contains {count} invalid values (NaN or Inf)")]
    InvalidEmbeddingValues {
        /// Number of invalid values found.
        count: usize,
    },

    /// Emotional intensity is out of the 1-10 range.
    #[error("intensity {0} is out of range [1, 10]")]
    InvalidIntensity(u8),
}

impl From<ValidationError> for MemoryError {
    fn from(err: ValidationError) -> Self {
        MemoryError::InvalidData(err.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Validators
// ─────────────────────────────────────────────────────────────────────────────

/// Validate an embedding vector.
///
/// Checks:
/// 1. Dimension matches the store's fixed dimension
/// 2. No NaN or Inf values
pub fn validate_embedding(
    embedding: &[f32],
    expected_dim: usize,
) -> std::result::Result<(), ValidationError> {
    if embedding.len() != expected_dim {
        return Err(ValidationError::DimensionMismatch {
            expected: expected_dim,
            actual: embedding.len(),
        });
    }

    let invalid_count = embedding
        .iter()
        .filter(|v| v.is_nan() || v.is_infinite())
        .count();

    if invalid_count > 0 {
        return Err(ValidationError::InvalidEmbeddingValues {
            count: invalid_count,
        });
    }

    Ok(())
}

/// Validate entry text before committing it.
pub fn validate_entry_text(text: &str) -> std::result::Result<(), ValidationError> {
    if text.trim().is_empty() {
        return Err(ValidationError::EmptyText);
    }
    Ok(())
}

/// Validate an emotional intensity value (1-10 scale).
pub fn validate_intensity(intensity: u8) -> std::result::Result<(), ValidationError> {
    if !(1..=10).contains(&intensity) {
        return Err(ValidationError::InvalidIntensity(intensity));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_embedding_ok() {
        assert!(validate_embedding(&[0.1, 0.2, 0.3], 3).is_ok());
    }

    #[test]
    fn test_validate_embedding_dimension_mismatch() {
        let err = validate_embedding(&[0.1, 0.2], 3).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_validate_embedding_rejects_nan_and_inf() {
        let err = validate_embedding(&[0.1, f32::NAN, f32::INFINITY], 3).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::InvalidEmbeddingValues { count: 2 }
        ));
    }

    #[test]
    fn test_validate_entry_text() {
        assert!(validate_entry_text("hello").is_ok());
        assert!(validate_entry_text("").is_err());
        assert!(validate_entry_text("   ").is_err());
    }

    #[test]
    fn test_validate_intensity_bounds() {
        assert!(validate_intensity(1).is_ok());
        assert!(validate_intensity(10).is_ok());
        assert!(validate_intensity(0).is_err());
        assert!(validate_intensity(11).is_err());
    }
}
