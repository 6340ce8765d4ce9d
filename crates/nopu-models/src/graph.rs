//! Architecture graph
//!
//! A catalog plan resolved against a parameter store. Building the graph is
//! where every configuration error surfaces: missing tensors or scales,
//! wrong weight shapes, unsupported kernels, multiplier counts and
//! accumulator headroom. A built graph can be executed without further checks
//! on its own parameters.

use crate::catalog::{Architecture, LayerPlan, OutputStage};
use crate::error::{ModelError, Result};
use crate::params::ParameterStore;
use nopu_kernels::{
    ensure_accumulator_headroom, pool, DenseMatrix, Dims, Filter, KernelSize, Requantization,
};

/// Resolved convolution layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvolutionLayer {
    index: usize,
    input: Dims,
    output: Dims,
    filter: Filter,
    bias: Vec<i32>,
    requant: Requantization,
}

impl ConvolutionLayer {
    /// Logical layer index
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Input dims
    pub const fn input(&self) -> Dims {
        self.input
    }

    /// Output dims
    pub const fn output(&self) -> Dims {
        self.output
    }

    /// Filter bank
    pub const fn filter(&self) -> &Filter {
        &self.filter
    }

    /// One bias per output channel
    pub fn bias(&self) -> &[i32] {
        &self.bias
    }

    /// Per-channel multipliers
    pub const fn requantization(&self) -> &Requantization {
        &self.requant
    }
}

/// Resolved max-pool layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLayer {
    input: Dims,
    output: Dims,
    window: usize,
    stride: usize,
}

impl PoolLayer {
    /// Input dims
    pub const fn input(&self) -> Dims {
        self.input
    }

    /// Output dims
    pub const fn output(&self) -> Dims {
        self.output
    }

    /// Window edge length
    pub const fn window(&self) -> usize {
        self.window
    }

    /// Stride
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Channels pooled independently
    pub const fn channels(&self) -> usize {
        self.input.channels
    }
}

/// How a dense layer finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenseStage {
    /// Requantize with one multiplier, then clipped ReLU
    Requantized(Requantization),
    /// Bias only; raw logits
    Logits,
}

/// Resolved dense layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseLayer {
    index: usize,
    weights: DenseMatrix,
    bias: Vec<i32>,
    stage: DenseStage,
}

impl DenseLayer {
    /// Logical layer index
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Weights, `inputs × outputs`
    pub const fn weights(&self) -> &DenseMatrix {
        &self.weights
    }

    /// One bias per output node
    pub fn bias(&self) -> &[i32] {
        &self.bias
    }

    /// Output stage
    pub const fn stage(&self) -> &DenseStage {
        &self.stage
    }

    /// Output dims
    pub const fn output(&self) -> Dims {
        Dims::vector(self.weights.outputs())
    }
}

/// Kind of a layer, for reports and dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Convolution
    Convolution,
    /// Max-pooling
    MaxPool,
    /// Flatten
    Flatten,
    /// Dense
    Dense,
}

impl std::fmt::Display for LayerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Convolution => "conv",
            Self::MaxPool => "maxpool",
            Self::Flatten => "flatten",
            Self::Dense => "dense",
        })
    }
}

/// One executable layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerDescriptor {
    /// Convolution + per-channel requantization + clipped ReLU
    Convolution(ConvolutionLayer),
    /// Non-overlapping max-pool
    MaxPool(PoolLayer),
    /// Reshape to a vector
    Flatten {
        /// Vector length
        len: usize,
    },
    /// Fully connected layer
    Dense(DenseLayer),
}

impl LayerDescriptor {
    /// Layer kind
    pub const fn kind(&self) -> LayerKind {
        match self {
            Self::Convolution(_) => LayerKind::Convolution,
            Self::MaxPool(_) => LayerKind::MaxPool,
            Self::Flatten { .. } => LayerKind::Flatten,
            Self::Dense(_) => LayerKind::Dense,
        }
    }

    /// Output dims
    pub const fn output(&self) -> Dims {
        match self {
            Self::Convolution(c) => c.output(),
            Self::MaxPool(p) => p.output(),
            Self::Flatten { len } => Dims::vector(*len),
            Self::Dense(d) => d.output(),
        }
    }
}

/// Validated, ordered layer list for one architecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureGraph {
    architecture: Architecture,
    layers: Vec<LayerDescriptor>,
}

impl ArchitectureGraph {
    /// Resolve `arch`'s plan against `store`
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found, in layer order.
    pub fn build(arch: Architecture, store: &ParameterStore) -> Result<Self> {
        store.check_architecture(arch)?;

        let mut layers = Vec::with_capacity(arch.layers().len());
        let mut index = 0;
        let mut current = arch.input_dims();

        for (position, plan) in arch.layers().iter().enumerate() {
            check_chain(position, plan, current)?;
            let layer = match *plan {
                LayerPlan::Convolution {
                    input,
                    kernel,
                    out_channels,
                } => {
                    let layer = build_convolution(store, index, input, kernel, out_channels)?;
                    index += 1;
                    LayerDescriptor::Convolution(layer)
                }
                LayerPlan::MaxPool {
                    input,
                    window,
                    stride,
                } => {
                    let output = pool::pooled_dims(input, window, stride)
                        .map_err(|e| ModelError::invalid_plan(position, e.to_string()))?;
                    LayerDescriptor::MaxPool(PoolLayer {
                        input,
                        output,
                        window,
                        stride,
                    })
                }
                LayerPlan::Flatten { len } => LayerDescriptor::Flatten { len },
                LayerPlan::Dense {
                    inputs,
                    outputs,
                    stage,
                } => {
                    let layer = build_dense(store, index, inputs, outputs, stage)?;
                    index += 1;
                    LayerDescriptor::Dense(layer)
                }
            };
            tracing::debug!("{arch}: {} → {}", layer.kind(), layer.output());
            current = layer.output();
            layers.push(layer);
        }

        if store.len() > index {
            let unused: Vec<usize> = store
                .iter()
                .map(crate::params::LayerParams::index)
                .filter(|i| *i >= index)
                .collect();
            tracing::warn!("{arch}: ignoring parameters for layers {unused:?}");
        }

        tracing::info!(
            "Built {arch}: {} layers, {index} with parameters",
            layers.len()
        );
        Ok(Self {
            architecture: arch,
            layers,
        })
    }

    /// Architecture the graph implements
    pub const fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Input image dims
    pub const fn input_dims(&self) -> Dims {
        self.architecture.input_dims()
    }

    /// Layers in execution order
    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    /// Number of layers
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True if the graph has no layers
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

fn check_shape(index: usize, expected: Vec<usize>, actual: &[usize]) -> Result<()> {
    if actual == expected.as_slice() {
        Ok(())
    } else {
        Err(ModelError::ParameterShape {
            index,
            expected,
            actual: actual.to_vec(),
        })
    }
}

fn check_bias(index: usize, bias: &[i32], expected: usize) -> Result<()> {
    if bias.len() == expected {
        Ok(())
    } else {
        Err(ModelError::invalid_layer(
            index,
            format!("expected {expected} biases, got {}", bias.len()),
        ))
    }
}

fn build_convolution(
    store: &ParameterStore,
    index: usize,
    input: Dims,
    kernel: usize,
    out_channels: usize,
) -> Result<ConvolutionLayer> {
    KernelSize::try_from(kernel).map_err(|e| ModelError::kernel(index, e))?;
    let params = store.layer(index)?;

    check_shape(
        index,
        vec![out_channels, kernel, kernel, input.channels],
        params.weight_shape(),
    )?;
    check_bias(index, params.bias(), out_channels)?;

    let filter = Filter::new(out_channels, kernel, input.channels, params.weights())
        .map_err(|e| ModelError::kernel(index, e))?;
    let output = filter
        .output_dims(input)
        .map_err(|e| ModelError::kernel(index, e))?;
    ensure_accumulator_headroom(filter.fan_in(), params.bias())
        .map_err(|e| ModelError::kernel(index, e))?;
    let requant = params.requantization(out_channels)?;

    Ok(ConvolutionLayer {
        index,
        input,
        output,
        filter,
        bias: params.bias().to_vec(),
        requant,
    })
}

fn build_dense(
    store: &ParameterStore,
    index: usize,
    inputs: usize,
    outputs: usize,
    stage: OutputStage,
) -> Result<DenseLayer> {
    let params = store.layer(index)?;

    check_shape(index, vec![outputs, inputs], params.weight_shape())?;
    check_bias(index, params.bias(), outputs)?;

    let weights = DenseMatrix::from_export(outputs, inputs, &params.weights())
        .map_err(|e| ModelError::kernel(index, e))?;
    ensure_accumulator_headroom(inputs, params.bias()).map_err(|e| ModelError::kernel(index, e))?;

    let stage = match stage {
        OutputStage::Requantized => DenseStage::Requantized(params.requantization(1)?),
        OutputStage::Logits => DenseStage::Logits,
    };

    Ok(DenseLayer {
        index,
        weights,
        bias: params.bias().to_vec(),
        stage,
    })
}

/// Plan layer at `position` must consume exactly what the previous stage yields
fn check_chain(position: usize, plan: &LayerPlan, current: Dims) -> Result<()> {
    if plan.input_len() == current.len() {
        return Ok(());
    }
    Err(ModelError::invalid_plan(
        position,
        format!(
            "layer expects {} inputs, previous stage yields {current}",
            plan.input_len()
        ),
    ))
}
