// SPDX-License-Identifier: AGPL-3.0-only

//! Inference engine
//!
//! Executes a validated [`ArchitectureGraph`] layer by layer with the
//! accelerator's integer arithmetic. Each step is the same sequence the
//! co-processor runs:
//!
//! ```text
//! conv:  correlate → add_bias → requantize (per channel) → clipped ReLU → u8
//! pool:  max over window
//! dense: matvec → add_bias → requantize → clipped ReLU → u8
//! last:  matvec → add_bias → i32 logits → argmax
//! ```
//!
//! The engine owns nothing mutable. Every call builds its own
//! [`ActivationBuffer`], so one engine can serve concurrent callers.

use crate::buffer::{ActivationBuffer, LayerOutput, LayerValues};
use crate::error::{Result, SimError};
use nopu_kernels::{activate, add_bias, correlate, max_pool, narrow, Dims, Tensor};
use nopu_models::{
    Architecture, ArchitectureGraph, DenseStage, LayerDescriptor, LayerKind, ParameterStore,
};
use tracing::{debug, info};

/// Engine options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Keep each layer's requantized accumulators before the clamp
    pub capture_accumulators: bool,
}

/// Result of one inference call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceResult {
    /// Index of the largest logit (lowest index on ties)
    pub predicted: usize,
    /// Every layer's output
    pub activations: ActivationBuffer,
}

/// Layer-by-layer executor for one architecture
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    graph: ArchitectureGraph,
    options: EngineOptions,
}

impl InferenceEngine {
    /// Resolve `arch` against `store` once; all configuration errors surface here.
    ///
    /// # Errors
    ///
    /// Returns error if the graph cannot be built.
    pub fn new(arch: Architecture, store: &ParameterStore) -> Result<Self> {
        let graph = ArchitectureGraph::build(arch, store)?;
        info!("Inference engine ready: {arch}, {} layers", graph.len());
        Ok(Self::from_graph(graph))
    }

    /// Wrap an already built graph
    pub fn from_graph(graph: ArchitectureGraph) -> Self {
        Self {
            graph,
            options: EngineOptions::default(),
        }
    }

    /// Set engine options
    #[must_use]
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Architecture being executed
    pub const fn architecture(&self) -> Architecture {
        self.graph.architecture()
    }

    /// Dims of the images this engine accepts
    pub const fn input_dims(&self) -> Dims {
        self.graph.input_dims()
    }

    /// Run one image through the network
    ///
    /// # Errors
    ///
    /// Returns [`SimError::InputShape`] if the image dims differ from the
    /// architecture's, or a kernel error if a layer rejects its operands.
    pub fn infer(&self, image: &Tensor<u8>) -> Result<InferenceResult> {
        let expected = self.input_dims();
        if image.dims() != expected {
            return Err(SimError::InputShape {
                expected,
                actual: image.dims(),
            });
        }

        let mut activations = ActivationBuffer::new();
        let mut nodes = image.clone();
        let mut logits = None;

        for (position, layer) in self.graph.layers().iter().enumerate() {
            let kernel_err = |e| SimError::kernel(position, e);
            let output = match layer {
                LayerDescriptor::Convolution(conv) => {
                    let mut acc = correlate(&nodes, conv.filter()).map_err(kernel_err)?;
                    add_bias(acc.as_mut_slice(), conv.bias()).map_err(kernel_err)?;
                    conv.requantization()
                        .apply(acc.as_mut_slice())
                        .map_err(kernel_err)?;
                    nodes = activate(&acc);
                    self.record(LayerKind::Convolution, &nodes, Some(acc.into_vec()))
                }
                LayerDescriptor::MaxPool(pool) => {
                    nodes = max_pool(&nodes, pool.window(), pool.stride()).map_err(kernel_err)?;
                    self.record(LayerKind::MaxPool, &nodes, None)
                }
                LayerDescriptor::Flatten { len } => {
                    nodes = nodes.reshape(Dims::vector(*len)).map_err(kernel_err)?;
                    self.record(LayerKind::Flatten, &nodes, None)
                }
                LayerDescriptor::Dense(dense) => {
                    let mut acc = dense.weights().matvec(nodes.as_slice()).map_err(kernel_err)?;
                    add_bias(&mut acc, dense.bias()).map_err(kernel_err)?;
                    match dense.stage() {
                        DenseStage::Requantized(requant) => {
                            requant.apply(&mut acc).map_err(kernel_err)?;
                            let narrowed = acc.iter().map(|v| narrow(*v)).collect();
                            nodes = Tensor::from_vec(Dims::vector(acc.len()), narrowed)
                                .map_err(kernel_err)?;
                            self.record(LayerKind::Dense, &nodes, Some(acc))
                        }
                        DenseStage::Logits => {
                            logits = Some(acc.clone());
                            LayerOutput {
                                kind: LayerKind::Dense,
                                dims: Dims::vector(acc.len()),
                                values: LayerValues::Logits(acc),
                                accumulators: None,
                            }
                        }
                    }
                }
            };
            debug!("layer {position} {}: {}", output.kind, output.dims);
            activations.push(output);
        }

        let logits = logits.ok_or(SimError::NoLogits)?;
        let predicted = argmax(&logits).ok_or(SimError::NoLogits)?;
        debug!("{}: predicted class {predicted}", self.architecture());
        Ok(InferenceResult {
            predicted,
            activations,
        })
    }

    fn record(&self, kind: LayerKind, nodes: &Tensor<u8>, acc: Option<Vec<i32>>) -> LayerOutput {
        LayerOutput {
            kind,
            dims: nodes.dims(),
            values: LayerValues::Activations(nodes.as_slice().to_vec()),
            accumulators: acc.filter(|_| self.options.capture_accumulators),
        }
    }
}

/// Index of the largest value; the first occurrence wins on ties
pub fn argmax(values: &[i32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, i32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Build an engine for `arch` and run one image
///
/// # Errors
///
/// See [`InferenceEngine::new`] and [`InferenceEngine::infer`].
pub fn infer(arch: Architecture, image: &Tensor<u8>, store: &ParameterStore) -> Result<InferenceResult> {
    InferenceEngine::new(arch, store)?.infer(image)
}
