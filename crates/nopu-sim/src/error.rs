//! Error types for simulation

use nopu_kernels::{Dims, KernelError};
use nopu_models::ModelError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for simulator operations
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while building or running the simulator
#[derive(Debug, Error)]
pub enum SimError {
    /// Architecture could not be resolved against its parameters
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Input image does not match the architecture
    #[error("Input shape mismatch: expected {expected}, got {actual}")]
    InputShape {
        /// Dims the architecture declares
        expected: Dims,
        /// Dims supplied
        actual: Dims,
    },

    /// A kernel rejected its operands during execution
    #[error("Layer {layer}: {source}")]
    Kernel {
        /// Position in the layer list
        layer: usize,
        /// Kernel-level error
        #[source]
        source: KernelError,
    },

    /// The network produced no logits
    #[error("Network produced no logits")]
    NoLogits,

    /// Layer position outside the activation buffer
    #[error("Layer {layer} out of range (have {count} layers)")]
    LayerIndex {
        /// Requested layer
        layer: usize,
        /// Number of layers recorded
        count: usize,
    },

    /// Trace file not found
    #[error("File not found: {path}")]
    FileNotFound {
        /// Path that was attempted
        path: PathBuf,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

impl SimError {
    /// Wrap a kernel error raised at layer position `layer`
    pub fn kernel(layer: usize, source: KernelError) -> Self {
        Self::Kernel { layer, source }
    }
}
