//! Architecture catalog
//!
//! The accelerator is co-verified against a fixed set of small sequential
//! networks. Each entry is declared here layer by layer with every dimension
//! written out; nothing is inferred from tensor names or shapes at run time.
//!
//! | Id | Input | Layers |
//! |----|-------|--------|
//! | `basic_fc` | 28×28×1 | FC 100 → FC 12 |
//! | `three_fc` | 28×28×1 | FC 32 → FC 16 → FC 12 |
//! | `min_conv` | 28×28×1 | Conv 16 → FC 12 |
//! | `min_pool` | 28×28×1 | Conv 16 → Pool → FC 12 |
//! | `basic_conv` | 28×28×1 | Conv 16 → Pool → Conv 16 → Pool → FC 64 → FC 12 |
//! | `cifar` | 32×32×3 | Conv 16 → Pool → Conv 16 → Pool → FC 64 → FC 12 |
//! | `cifar_wide` | 32×32×3 | Conv 32 → Pool → Conv 64 → Pool → FC 64 → FC 12 |
//!
//! Every network ends in a 12-node logits layer (bias only, no requantization),
//! which is what the hardware's last fully-connected stage writes.

use crate::error::{ModelError, Result};
use nopu_kernels::{pool, Dims};
use std::str::FromStr;

/// How a dense layer finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStage {
    /// Bias, requantize, clipped ReLU, narrow to `u8`
    Requantized,
    /// Bias only; raw `i32` logits for the argmax
    Logits,
}

/// One declared layer of a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerPlan {
    /// Valid-mode convolution + per-channel requantization + clipped ReLU
    Convolution {
        /// Declared input dims
        input: Dims,
        /// Kernel edge length
        kernel: usize,
        /// Number of filters
        out_channels: usize,
    },
    /// Non-overlapping max-pooling
    MaxPool {
        /// Declared input dims
        input: Dims,
        /// Window edge length
        window: usize,
        /// Stride
        stride: usize,
    },
    /// HWC → vector reshape
    Flatten {
        /// Reshape target length
        len: usize,
    },
    /// Fully connected layer
    Dense {
        /// Input nodes
        inputs: usize,
        /// Output nodes
        outputs: usize,
        /// Requantized hidden layer or final logits
        stage: OutputStage,
    },
}

impl LayerPlan {
    /// True for layers that read weights from the parameter store
    pub const fn has_parameters(&self) -> bool {
        matches!(self, Self::Convolution { .. } | Self::Dense { .. })
    }

    /// Number of input elements the layer declares
    pub const fn input_len(&self) -> usize {
        match self {
            Self::Convolution { input, .. } | Self::MaxPool { input, .. } => input.len(),
            Self::Flatten { len } => *len,
            Self::Dense { inputs, .. } => *inputs,
        }
    }

    /// Dims of the layer's output as declared by the catalog.
    ///
    /// Returns `None` for a pooling window the hardware cannot run.
    pub fn output_dims(&self) -> Option<Dims> {
        match *self {
            Self::Convolution {
                input,
                kernel,
                out_channels,
            } => (input.height >= kernel && input.width >= kernel).then(|| {
                Dims::new(
                    input.height - kernel + 1,
                    input.width - kernel + 1,
                    out_channels,
                )
            }),
            Self::MaxPool {
                input,
                window,
                stride,
            } => pool::pooled_dims(input, window, stride).ok(),
            Self::Flatten { len } => Some(Dims::vector(len)),
            Self::Dense { outputs, .. } => Some(Dims::vector(outputs)),
        }
    }
}

use LayerPlan::{Convolution, Dense, Flatten, MaxPool};
use OutputStage::{Logits, Requantized};

const MNIST: Dims = Dims::new(28, 28, 1);
const CIFAR: Dims = Dims::new(32, 32, 3);

const BASIC_FC: &[LayerPlan] = &[
    Flatten { len: 784 },
    Dense { inputs: 784, outputs: 100, stage: Requantized },
    Dense { inputs: 100, outputs: 12, stage: Logits },
];

const THREE_FC: &[LayerPlan] = &[
    Flatten { len: 784 },
    Dense { inputs: 784, outputs: 32, stage: Requantized },
    Dense { inputs: 32, outputs: 16, stage: Requantized },
    Dense { inputs: 16, outputs: 12, stage: Logits },
];

const MIN_CONV: &[LayerPlan] = &[
    Convolution { input: MNIST, kernel: 3, out_channels: 16 },
    Flatten { len: 26 * 26 * 16 },
    Dense { inputs: 26 * 26 * 16, outputs: 12, stage: Logits },
];

const MIN_POOL: &[LayerPlan] = &[
    Convolution { input: MNIST, kernel: 3, out_channels: 16 },
    MaxPool { input: Dims::new(26, 26, 16), window: 2, stride: 2 },
    Flatten { len: 13 * 13 * 16 },
    Dense { inputs: 13 * 13 * 16, outputs: 12, stage: Logits },
];

const BASIC_CONV: &[LayerPlan] = &[
    Convolution { input: MNIST, kernel: 3, out_channels: 16 },
    MaxPool { input: Dims::new(26, 26, 16), window: 2, stride: 2 },
    Convolution { input: Dims::new(13, 13, 16), kernel: 3, out_channels: 16 },
    MaxPool { input: Dims::new(11, 11, 16), window: 2, stride: 2 },
    Flatten { len: 5 * 5 * 16 },
    Dense { inputs: 5 * 5 * 16, outputs: 64, stage: Requantized },
    Dense { inputs: 64, outputs: 12, stage: Logits },
];

const CIFAR_CONV: &[LayerPlan] = &[
    Convolution { input: CIFAR, kernel: 3, out_channels: 16 },
    MaxPool { input: Dims::new(30, 30, 16), window: 2, stride: 2 },
    Convolution { input: Dims::new(15, 15, 16), kernel: 3, out_channels: 16 },
    MaxPool { input: Dims::new(13, 13, 16), window: 2, stride: 2 },
    Flatten { len: 6 * 6 * 16 },
    Dense { inputs: 6 * 6 * 16, outputs: 64, stage: Requantized },
    Dense { inputs: 64, outputs: 12, stage: Logits },
];

const CIFAR_WIDE: &[LayerPlan] = &[
    Convolution { input: CIFAR, kernel: 3, out_channels: 32 },
    MaxPool { input: Dims::new(30, 30, 32), window: 2, stride: 2 },
    Convolution { input: Dims::new(15, 15, 32), kernel: 3, out_channels: 64 },
    MaxPool { input: Dims::new(13, 13, 64), window: 2, stride: 2 },
    Flatten { len: 6 * 6 * 64 },
    Dense { inputs: 6 * 6 * 64, outputs: 64, stage: Requantized },
    Dense { inputs: 64, outputs: 12, stage: Logits },
];

/// Networks the accelerator is verified against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Two dense layers on MNIST
    BasicFc,
    /// Three dense layers on MNIST
    ThreeFc,
    /// One convolution + dense on MNIST
    MinConv,
    /// Convolution + pool + dense on MNIST
    MinPool,
    /// Two convolutions + two dense layers on MNIST
    BasicConv,
    /// Two convolutions + two dense layers on 32×32×3
    Cifar,
    /// Wider two-convolution network on 32×32×3
    CifarWide,
}

impl Architecture {
    /// Catalog identifier
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BasicFc => "basic_fc",
            Self::ThreeFc => "three_fc",
            Self::MinConv => "min_conv",
            Self::MinPool => "min_pool",
            Self::BasicConv => "basic_conv",
            Self::Cifar => "cifar",
            Self::CifarWide => "cifar_wide",
        }
    }

    /// Human-readable description
    pub const fn description(&self) -> &'static str {
        match self {
            Self::BasicFc => "MNIST, FC(784→100) → FC(100→12)",
            Self::ThreeFc => "MNIST, FC(784→32) → FC(32→16) → FC(16→12)",
            Self::MinConv => "MNIST, Conv3×3(16) → FC(10816→12)",
            Self::MinPool => "MNIST, Conv3×3(16) → MaxPool2 → FC(2704→12)",
            Self::BasicConv => {
                "MNIST, Conv3×3(16) → MaxPool2 → Conv3×3(16) → MaxPool2 → FC(400→64) → FC(64→12)"
            }
            Self::Cifar => {
                "CIFAR-10, Conv3×3(16) → MaxPool2 → Conv3×3(16) → MaxPool2 → FC(576→64) → FC(64→12)"
            }
            Self::CifarWide => {
                "CIFAR-10, Conv3×3(32) → MaxPool2 → Conv3×3(64) → MaxPool2 → FC(2304→64) → FC(64→12)"
            }
        }
    }

    /// Declared layer sequence
    pub const fn layers(&self) -> &'static [LayerPlan] {
        match self {
            Self::BasicFc => BASIC_FC,
            Self::ThreeFc => THREE_FC,
            Self::MinConv => MIN_CONV,
            Self::MinPool => MIN_POOL,
            Self::BasicConv => BASIC_CONV,
            Self::Cifar => CIFAR_CONV,
            Self::CifarWide => CIFAR_WIDE,
        }
    }

    /// Dims of one input image
    pub const fn input_dims(&self) -> Dims {
        match self {
            Self::BasicFc | Self::ThreeFc | Self::MinConv | Self::MinPool | Self::BasicConv => {
                MNIST
            }
            Self::Cifar | Self::CifarWide => CIFAR,
        }
    }

    /// Number of output classes (size of the logits layer)
    pub fn num_classes(&self) -> usize {
        match self.layers().last() {
            Some(Dense { outputs, .. }) => *outputs,
            _ => 0,
        }
    }

    /// Number of layers that read the parameter store
    pub fn parameter_layers(&self) -> usize {
        self.layers().iter().filter(|l| l.has_parameters()).count()
    }

    /// All catalog entries
    pub const fn all() -> &'static [Self] {
        &[
            Self::BasicFc,
            Self::ThreeFc,
            Self::MinConv,
            Self::MinPool,
            Self::BasicConv,
            Self::Cifar,
            Self::CifarWide,
        ]
    }

    fn valid_names() -> String {
        Self::all()
            .iter()
            .map(Self::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for Architecture {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|a| a.name() == s)
            .ok_or_else(|| ModelError::UnknownArchitecture {
                name: s.to_string(),
                valid: Self::valid_names(),
            })
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
