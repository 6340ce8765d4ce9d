//! Error types for kernel arithmetic

use crate::tensor::Dims;
use thiserror::Error;

/// Result type alias for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors raised by the arithmetic kernels.
///
/// All of these are fatal: they indicate a layer configuration the hardware
/// could not execute either.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Kernel size other than 3×3 or 5×5
    #[error("Unsupported kernel size {size}×{size} (supported: 3×3, 5×5)")]
    UnsupportedKernel {
        /// Requested kernel edge length
        size: usize,
    },

    /// Tensor dimensions do not match what the operation expects
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Operation that rejected the shape
        context: &'static str,
        /// Expected dimensions
        expected: Dims,
        /// Actual dimensions
        actual: Dims,
    },

    /// Buffer length does not match the declared shape
    #[error("Length mismatch in {context}: expected {expected} elements, got {actual}")]
    LengthMismatch {
        /// Operation that rejected the buffer
        context: &'static str,
        /// Expected element count
        expected: usize,
        /// Actual element count
        actual: usize,
    },

    /// Pooling window that the hardware cannot execute
    #[error("Invalid pooling: {reason}")]
    InvalidPool {
        /// Reason for failure
        reason: String,
    },

    /// Requantization multiplier cannot be represented
    #[error("Invalid requantization multiplier: {reason}")]
    InvalidMultiplier {
        /// Reason for failure
        reason: String,
    },

    /// Number of multipliers does not match the layer
    #[error("Requantization multiplier count mismatch: expected {expected}, got {actual}")]
    MultiplierCount {
        /// Expected count (1 or out-channel count)
        expected: usize,
        /// Count supplied
        actual: usize,
    },

    /// 32-bit accumulator would wrap
    #[error("Accumulator overflow: {reason}")]
    AccumulatorOverflow {
        /// Reason for failure
        reason: String,
    },
}

impl KernelError {
    /// Create an invalid pooling error
    pub fn invalid_pool(reason: impl Into<String>) -> Self {
        Self::InvalidPool {
            reason: reason.into(),
        }
    }

    /// Create an invalid multiplier error
    pub fn invalid_multiplier(reason: impl Into<String>) -> Self {
        Self::InvalidMultiplier {
            reason: reason.into(),
        }
    }

    /// Create an accumulator overflow error
    pub fn overflow(reason: impl Into<String>) -> Self {
        Self::AccumulatorOverflow {
            reason: reason.into(),
        }
    }
}
