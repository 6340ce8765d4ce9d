//! Parameter store
//!
//! Trained tensors keyed by **logical layer index**: the ordinal of a
//! parameter-bearing layer (convolution or dense) in catalog order. The
//! hardware numbers its multiplier registers the same way (`ms_0`, `ms_1`, …).

use crate::catalog::Architecture;
use crate::error::{ModelError, Result};
use bytes::Bytes;
use nopu_kernels::{FixedPointMultiplier, Requantization};
use std::collections::BTreeMap;

/// Requantization metadata as exported with a layer
#[derive(Debug, Clone, PartialEq)]
pub enum RequantSource {
    /// Float scales; each multiplier is `bias[i] / activation`
    Scales {
        /// Bias scale per multiplier
        bias: Vec<f32>,
        /// Activation scale of the layer output
        activation: f32,
    },
    /// Integer multipliers as programmed into the hardware
    FixedPoint(Vec<FixedPointMultiplier>),
}

impl RequantSource {
    /// Number of multipliers this metadata describes
    pub fn len(&self) -> usize {
        match self {
            Self::Scales { bias, .. } => bias.len(),
            Self::FixedPoint(ms) => ms.len(),
        }
    }

    /// True if no multipliers are described
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tensors for one parameter-bearing layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    index: usize,
    weight_shape: Vec<usize>,
    /// Two's-complement `i8` weights in export order
    weights: Bytes,
    bias: Vec<i32>,
    requant: Option<RequantSource>,
}

impl LayerParams {
    /// Create layer parameters
    ///
    /// # Errors
    ///
    /// Returns error if the weight blob does not hold `product(weight_shape)` values.
    pub fn new(
        index: usize,
        weight_shape: Vec<usize>,
        weights: impl Into<Bytes>,
        bias: Vec<i32>,
    ) -> Result<Self> {
        let weights = weights.into();
        let expected: usize = weight_shape.iter().product();
        if weights.len() != expected {
            return Err(ModelError::invalid_layer(
                index,
                format!(
                    "weight shape {weight_shape:?} needs {expected} values, got {}",
                    weights.len()
                ),
            ));
        }
        Ok(Self {
            index,
            weight_shape,
            weights,
            bias,
            requant: None,
        })
    }

    /// Build from signed weights
    ///
    /// # Errors
    ///
    /// See [`LayerParams::new`].
    pub fn from_i8(index: usize, weight_shape: Vec<usize>, weights: &[i8], bias: Vec<i32>) -> Result<Self> {
        let raw: Vec<u8> = weights.iter().map(|w| w.to_le_bytes()[0]).collect();
        Self::new(index, weight_shape, raw, bias)
    }

    /// Layer whose weight count matches its shape by construction
    pub(crate) fn generated(
        index: usize,
        weight_shape: Vec<usize>,
        weights: Vec<i8>,
        bias: Vec<i32>,
        requant: Option<RequantSource>,
    ) -> Self {
        debug_assert_eq!(weights.len(), weight_shape.iter().product::<usize>());
        Self {
            index,
            weight_shape,
            weights: weights.iter().map(|w| w.to_le_bytes()[0]).collect(),
            bias,
            requant,
        }
    }

    /// Attach requantization metadata
    #[must_use]
    pub fn with_requant(mut self, requant: RequantSource) -> Self {
        self.requant = Some(requant);
        self
    }

    /// Logical layer index
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Declared weight shape
    pub fn weight_shape(&self) -> &[usize] {
        &self.weight_shape
    }

    /// Raw weight bytes
    pub fn raw_weights(&self) -> &Bytes {
        &self.weights
    }

    /// Weights as `i8`
    pub fn weights(&self) -> Vec<i8> {
        self.weights.iter().map(|b| i8::from_le_bytes([*b])).collect()
    }

    /// Bias vector
    pub fn bias(&self) -> &[i32] {
        &self.bias
    }

    /// Requantization metadata, if exported
    pub fn requant(&self) -> Option<&RequantSource> {
        self.requant.as_ref()
    }

    /// Integer multipliers for this layer, converting float scales once.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingScale`] if no metadata was exported, or a
    /// kernel error if a scale ratio cannot be represented.
    pub fn multipliers(&self) -> Result<Vec<FixedPointMultiplier>> {
        match &self.requant {
            None => Err(ModelError::missing_scale(self.index)),
            Some(RequantSource::FixedPoint(ms)) => Ok(ms.clone()),
            Some(RequantSource::Scales { bias, activation }) => bias
                .iter()
                .map(|b| {
                    FixedPointMultiplier::from_scales(*b, *activation)
                        .map_err(|e| ModelError::kernel(self.index, e))
                })
                .collect(),
        }
    }

    /// Requantization for a layer with `expected_count` multipliers
    /// (1 for dense layers, the output-channel count for convolutions).
    ///
    /// # Errors
    ///
    /// Returns error if metadata is missing or the multiplier count differs.
    pub fn requantization(&self, expected_count: usize) -> Result<Requantization> {
        let ms = self.multipliers()?;
        let requant = if expected_count == 1 {
            Requantization::for_dense(&ms)
        } else {
            Requantization::for_convolution(&ms, expected_count)
        };
        requant.map_err(|e| ModelError::kernel(self.index, e))
    }
}

/// Immutable map from logical layer index to [`LayerParams`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterStore {
    architecture: Option<Architecture>,
    layers: BTreeMap<usize, LayerParams>,
}

impl ParameterStore {
    /// Collect layers into a store
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::DuplicateLayer`] if two layers share an index.
    pub fn from_layers(
        architecture: Option<Architecture>,
        layers: impl IntoIterator<Item = LayerParams>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for layer in layers {
            let index = layer.index;
            if map.insert(index, layer).is_some() {
                return Err(ModelError::DuplicateLayer { index });
            }
        }
        Ok(Self {
            architecture,
            layers: map,
        })
    }

    /// Store from layers with distinct indices
    pub(crate) fn generated(architecture: Architecture, layers: Vec<LayerParams>) -> Self {
        Self {
            architecture: Some(architecture),
            layers: layers.into_iter().map(|l| (l.index, l)).collect(),
        }
    }

    /// Architecture the parameters were exported for, if recorded
    pub const fn architecture(&self) -> Option<Architecture> {
        self.architecture
    }

    /// Parameters for one logical layer
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::MissingLayer`] if the index is absent.
    pub fn layer(&self, index: usize) -> Result<&LayerParams> {
        self.layers
            .get(&index)
            .ok_or(ModelError::MissingLayer { index })
    }

    /// Check that the store may be used for `arch`
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ArchitectureMismatch`] if the store records another architecture.
    pub fn check_architecture(&self, arch: Architecture) -> Result<()> {
        match self.architecture {
            Some(found) if found != arch => Err(ModelError::ArchitectureMismatch {
                expected: arch.to_string(),
                found: found.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Number of layers held
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// True if the store holds no layers
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layers in index order
    pub fn iter(&self) -> impl Iterator<Item = &LayerParams> {
        self.layers.values()
    }
}
