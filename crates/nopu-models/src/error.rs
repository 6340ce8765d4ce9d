//! Error types for catalog, parameter and input operations

use nopu_kernels::KernelError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while resolving an architecture against its parameters
#[derive(Debug, Error)]
pub enum ModelError {
    /// File not found or cannot be read
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

    /// Parameter artifact is not valid JSON for the expected schema
    #[error("Malformed parameter artifact: {source}")]
    Json {
        /// Underlying serde error
        #[from]
        source: serde_json::Error,
    },

    /// Artifact written by an incompatible exporter
    #[error("Unsupported artifact format version {version} (expected {expected})")]
    UnsupportedFormat {
        /// Version found in the artifact
        version: u32,
        /// Version this crate reads
        expected: u32,
    },

    /// Architecture identifier outside the catalog
    #[error("Unknown architecture '{name}' (valid: {valid})")]
    UnknownArchitecture {
        /// Identifier that was requested
        name: String,
        /// Comma-separated list of catalog identifiers
        valid: String,
    },

    /// Artifact was exported for a different architecture
    #[error("Parameters were exported for '{found}', not '{expected}'")]
    ArchitectureMismatch {
        /// Architecture being built
        expected: String,
        /// Architecture recorded in the artifact
        found: String,
    },

    /// No tensors for a parameter layer the architecture declares
    #[error("Missing parameters for layer {index}")]
    MissingLayer {
        /// Logical layer index
        index: usize,
    },

    /// The same logical layer index appears twice
    #[error("Duplicate parameters for layer {index}")]
    DuplicateLayer {
        /// Logical layer index
        index: usize,
    },

    /// No scale or multiplier metadata for a requantizing layer
    #[error("Missing requantization scale for layer {index}")]
    MissingScale {
        /// Logical layer index
        index: usize,
    },

    /// Weight tensor shape disagrees with the catalog
    #[error("Layer {index}: weight shape {actual:?} does not match declared {expected:?}")]
    ParameterShape {
        /// Logical layer index
        index: usize,
        /// Shape the catalog declares
        expected: Vec<usize>,
        /// Shape the artifact supplies
        actual: Vec<usize>,
    },

    /// Invalid layer configuration
    #[error("Invalid layer {index}: {reason}")]
    InvalidLayer {
        /// Logical layer index
        index: usize,
        /// Reason for failure
        reason: String,
    },

    /// Catalog plan does not chain at this layer position
    #[error("Plan position {position}: {reason}")]
    InvalidPlan {
        /// Position in the plan, counting every layer
        position: usize,
        /// Reason for failure
        reason: String,
    },

    /// Kernel rejected a layer's configuration
    #[error("Layer {index}: {source}")]
    Kernel {
        /// Logical layer index
        index: usize,
        /// Kernel-level error
        #[source]
        source: KernelError,
    },

    /// Canonical input file is malformed
    #[error("Invalid input set: {reason}")]
    InvalidInputSet {
        /// Reason for failure
        reason: String,
    },

    /// Input index out of range
    #[error("Input index {index} out of range (have {count} inputs)")]
    InputIndex {
        /// Requested index
        index: usize,
        /// Number of inputs available
        count: usize,
    },
}

impl ModelError {
    /// Create an invalid layer error
    pub fn invalid_layer(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidLayer {
            index,
            reason: reason.into(),
        }
    }

    /// Create an invalid plan error for layer `position`
    pub fn invalid_plan(position: usize, reason: impl Into<String>) -> Self {
        Self::InvalidPlan {
            position,
            reason: reason.into(),
        }
    }

    /// Create a missing scale error
    pub fn missing_scale(index: usize) -> Self {
        Self::MissingScale { index }
    }

    /// Wrap a kernel error raised while building layer `index`
    pub fn kernel(index: usize, source: KernelError) -> Self {
        Self::Kernel { index, source }
    }

    /// Create an invalid input set error
    pub fn invalid_inputs(reason: impl Into<String>) -> Self {
        Self::InvalidInputSet {
            reason: reason.into(),
        }
    }
}
